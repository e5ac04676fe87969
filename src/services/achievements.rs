use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::db::DatabaseProxy;
use crate::services::xp;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub condition: AchievementCondition,
    pub xp_reward: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UserProgressStats {
    pub topics_completed: i64,
    pub streak_days: i64,
    pub quizzes_passed: i64,
}

pub fn is_condition_met(condition: &AchievementCondition, stats: &UserProgressStats) -> bool {
    match condition.condition_type.as_str() {
        "topics_completed" => stats.topics_completed >= condition.value as i64,
        "streak" => stats.streak_days >= condition.value as i64,
        "quizzes_passed" => stats.quizzes_passed >= condition.value as i64,
        _ => false,
    }
}

/// Re-evaluates achievement rules for a user and unlocks anything newly
/// earned. Invoked fire-and-forget after topic completion; callers only log
/// failures.
pub async fn check_achievements(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<String>, String> {
    let pool = proxy.pool();
    let definitions = load_definitions(pool).await?;
    let unlocked = load_unlocked_ids(pool, user_id).await?;
    let stats = load_progress_stats(pool, user_id).await?;

    let mut newly_unlocked = Vec::new();
    for def in definitions {
        if unlocked.contains(&def.id) {
            continue;
        }
        if !is_condition_met(&def.condition, &stats) {
            continue;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO user_achievements (user_id, achievement_id, unlocked_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, achievement_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&def.id)
        .execute(pool)
        .await
        .map_err(|e| format!("failed to unlock achievement: {e}"))?;

        if inserted.rows_affected() == 0 {
            continue;
        }

        if def.xp_reward > 0 {
            xp::award_xp(
                proxy,
                user_id,
                def.xp_reward,
                "achievement",
                Some("achievement"),
                Some(&def.id),
            )
            .await?;
        }

        info!(user_id, achievement = %def.name, "achievement unlocked");
        newly_unlocked.push(def.id);
    }

    Ok(newly_unlocked)
}

async fn load_definitions(pool: &PgPool) -> Result<Vec<AchievementDefinition>, String> {
    let rows = sqlx::query(
        r#"SELECT id, name, condition, xp_reward FROM achievement_definitions ORDER BY id"#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load achievement definitions: {e}"))?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let condition = row
                .try_get::<sqlx::types::Json<serde_json::Value>, _>("condition")
                .ok()
                .and_then(|json| serde_json::from_value::<AchievementCondition>(json.0).ok())?;
            Some(AchievementDefinition {
                id: row.try_get("id").unwrap_or_default(),
                name: row.try_get("name").unwrap_or_default(),
                xp_reward: row.try_get::<i32, _>("xp_reward").map(|v| v as i64).unwrap_or(0),
                condition,
            })
        })
        .collect())
}

async fn load_unlocked_ids(pool: &PgPool, user_id: &str) -> Result<HashSet<String>, String> {
    let rows = sqlx::query(r#"SELECT achievement_id FROM user_achievements WHERE user_id = $1"#)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|e| format!("failed to load unlocked achievements: {e}"))?;

    Ok(rows
        .into_iter()
        .map(|row| row.try_get("achievement_id").unwrap_or_default())
        .collect())
}

async fn load_progress_stats(pool: &PgPool, user_id: &str) -> Result<UserProgressStats, String> {
    let topics_completed: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM topic_completions WHERE user_id = $1 AND completed_at IS NOT NULL"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|e| format!("failed to count completed topics: {e}"))?;

    let streak_days: i64 =
        sqlx::query_scalar(r#"SELECT streak_days FROM user_levels WHERE user_id = $1"#)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| format!("failed to load streak: {e}"))?
            .unwrap_or(0);

    let quizzes_passed: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(DISTINCT quiz_id) FROM quiz_attempts WHERE user_id = $1 AND passed = TRUE"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|e| format!("failed to count passed quizzes: {e}"))?;

    Ok(UserProgressStats {
        topics_completed,
        streak_days,
        quizzes_passed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(ctype: &str, value: f64) -> AchievementCondition {
        AchievementCondition {
            condition_type: ctype.to_string(),
            value,
        }
    }

    #[test]
    fn test_topics_completed_threshold() {
        let stats = UserProgressStats {
            topics_completed: 5,
            ..Default::default()
        };
        assert!(is_condition_met(&condition("topics_completed", 5.0), &stats));
        assert!(!is_condition_met(&condition("topics_completed", 6.0), &stats));
    }

    #[test]
    fn test_unknown_condition_type_never_matches() {
        let stats = UserProgressStats {
            topics_completed: 100,
            streak_days: 100,
            quizzes_passed: 100,
        };
        assert!(!is_condition_met(&condition("wingspan", 1.0), &stats));
    }
}
