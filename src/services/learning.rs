use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::warn;

use crate::db::DatabaseProxy;
use crate::services::{achievements, streak, xp};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicCompletionInfo {
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub completion_percentage: i64,
    pub time_spent_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub id: String,
    pub product_id: Option<String>,
    pub title: String,
    pub position: i64,
    pub prerequisites: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<TopicCompletionInfo>,
    pub is_locked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockCompletionInfo {
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub score: Option<i64>,
    pub time_spent_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningBlockInfo {
    pub id: String,
    pub block_type: String,
    pub position: i64,
    pub required_for_completion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<BlockCompletionInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicWithProgress {
    #[serde(flatten)]
    pub topic: TopicSummary,
    pub blocks: Vec<LearningBlockInfo>,
}

/// A topic is locked iff it has prerequisites and the user's completed set
/// does not cover all of them.
pub fn is_topic_locked(prerequisites: &[String], completed: &HashSet<String>) -> bool {
    !prerequisites.is_empty() && !prerequisites.iter().all(|p| completed.contains(p))
}

/// Required blocks still missing a completion timestamp.
pub fn outstanding_required_blocks(blocks: &[(String, bool, bool)]) -> Vec<String> {
    blocks
        .iter()
        .filter(|(_, required, completed)| *required && !*completed)
        .map(|(id, _, _)| id.clone())
        .collect()
}

fn to_rfc3339(dt: Option<NaiveDateTime>) -> Option<String> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339())
}

/// Published topics for a product with the user's completion state and the
/// lock flag computed for every topic, not just on start.
pub async fn list_topics(
    proxy: &DatabaseProxy,
    user_id: &str,
    product_id: Option<&str>,
) -> Result<Vec<TopicSummary>, String> {
    let pool = proxy.pool();

    let rows = if let Some(product_id) = product_id {
        sqlx::query(
            r#"
            SELECT id, product_id, title, position, prerequisites
            FROM topics
            WHERE published = TRUE AND product_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query(
            r#"
            SELECT id, product_id, title, position, prerequisites
            FROM topics
            WHERE published = TRUE
            ORDER BY position ASC
            "#,
        )
        .fetch_all(pool)
        .await
    }
    .map_err(|e| format!("failed to load topics: {e}"))?;

    let completions = load_topic_completions(pool, user_id).await?;
    let completed: HashSet<String> = completions
        .iter()
        .filter(|(_, c)| c.completed_at.is_some())
        .map(|(id, _)| id.clone())
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| {
            let id: String = row.try_get("id").unwrap_or_default();
            let prerequisites = row
                .try_get::<sqlx::types::Json<Vec<String>>, _>("prerequisites")
                .map(|json| json.0)
                .unwrap_or_default();
            let completion = completions.get(&id).cloned();
            TopicSummary {
                is_locked: is_topic_locked(&prerequisites, &completed),
                product_id: row.try_get("product_id").ok(),
                title: row.try_get("title").unwrap_or_default(),
                position: row.try_get::<i32, _>("position").map(|v| v as i64).unwrap_or(0),
                prerequisites,
                completion,
                id,
            }
        })
        .collect())
}

pub async fn get_topic_with_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    topic_id: &str,
) -> Result<Option<TopicWithProgress>, String> {
    let pool = proxy.pool();

    let Some(row) = sqlx::query(
        r#"SELECT id, product_id, title, position, prerequisites FROM topics WHERE id = $1"#,
    )
    .bind(topic_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("failed to load topic: {e}"))?
    else {
        return Ok(None);
    };

    let prerequisites = row
        .try_get::<sqlx::types::Json<Vec<String>>, _>("prerequisites")
        .map(|json| json.0)
        .unwrap_or_default();

    let completions = load_topic_completions(pool, user_id).await?;
    let completed: HashSet<String> = completions
        .iter()
        .filter(|(_, c)| c.completed_at.is_some())
        .map(|(id, _)| id.clone())
        .collect();

    let topic = TopicSummary {
        id: row.try_get("id").unwrap_or_default(),
        product_id: row.try_get("product_id").ok(),
        title: row.try_get("title").unwrap_or_default(),
        position: row.try_get::<i32, _>("position").map(|v| v as i64).unwrap_or(0),
        is_locked: is_topic_locked(&prerequisites, &completed),
        completion: completions.get(topic_id).cloned(),
        prerequisites,
    };

    let blocks = load_blocks_with_completion(pool, user_id, topic_id).await?;

    Ok(Some(TopicWithProgress { topic, blocks }))
}

/// Gate + upsert. Rejects unknown, locked, and already-completed topics;
/// repeated calls before completion just reset `started_at`.
pub async fn start_topic(
    proxy: &DatabaseProxy,
    user_id: &str,
    topic_id: &str,
) -> Result<(), String> {
    let pool = proxy.pool();

    let Some(row) = sqlx::query(r#"SELECT prerequisites FROM topics WHERE id = $1"#)
        .bind(topic_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("failed to load topic: {e}"))?
    else {
        return Err("Topic not found".to_string());
    };

    let prerequisites = row
        .try_get::<sqlx::types::Json<Vec<String>>, _>("prerequisites")
        .map(|json| json.0)
        .unwrap_or_default();

    let completions = load_topic_completions(pool, user_id).await?;
    if completions
        .get(topic_id)
        .is_some_and(|c| c.completed_at.is_some())
    {
        return Err("Topic already completed".to_string());
    }

    let completed: HashSet<String> = completions
        .iter()
        .filter(|(_, c)| c.completed_at.is_some())
        .map(|(id, _)| id.clone())
        .collect();

    if is_topic_locked(&prerequisites, &completed) {
        let missing: Vec<&str> = prerequisites
            .iter()
            .filter(|p| !completed.contains(*p))
            .map(|p| p.as_str())
            .collect();
        return Err(format!(
            "Topic is locked. Complete prerequisites first: {}",
            missing.join(", ")
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO topic_completions (user_id, topic_id, started_at, completion_percentage, time_spent_seconds)
        VALUES ($1, $2, NOW(), 0, 0)
        ON CONFLICT (user_id, topic_id) DO UPDATE
        SET started_at = EXCLUDED.started_at,
            completion_percentage = 0
        "#,
    )
    .bind(user_id)
    .bind(topic_id)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to start topic: {e}"))?;

    Ok(())
}

pub async fn start_learning_block(
    proxy: &DatabaseProxy,
    user_id: &str,
    block_id: &str,
) -> Result<(), String> {
    sqlx::query(
        r#"
        INSERT INTO learning_block_completions (user_id, learning_block_id, started_at, time_spent_seconds)
        VALUES ($1, $2, NOW(), 0)
        ON CONFLICT (user_id, learning_block_id) DO UPDATE
        SET started_at = EXCLUDED.started_at
        "#,
    )
    .bind(user_id)
    .bind(block_id)
    .execute(proxy.pool())
    .await
    .map_err(|e| format!("failed to start learning block: {e}"))?;
    Ok(())
}

/// Marks the block complete and grants the per-type XP. Every call grants
/// again: one call corresponds to one block instance.
pub async fn complete_learning_block(
    proxy: &DatabaseProxy,
    user_id: &str,
    block_id: &str,
    time_spent_seconds: i64,
    score: Option<i64>,
) -> Result<(), String> {
    let pool = proxy.pool();

    let Some(row) = sqlx::query(r#"SELECT block_type FROM learning_blocks WHERE id = $1"#)
        .bind(block_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| format!("failed to load learning block: {e}"))?
    else {
        return Err("Learning block not found".to_string());
    };
    let block_type: String = row.try_get("block_type").unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO learning_block_completions
          (user_id, learning_block_id, started_at, completed_at, score, time_spent_seconds)
        VALUES ($1, $2, NOW(), NOW(), $3, $4)
        ON CONFLICT (user_id, learning_block_id) DO UPDATE
        SET completed_at = NOW(),
            score = EXCLUDED.score,
            time_spent_seconds = EXCLUDED.time_spent_seconds
        "#,
    )
    .bind(user_id)
    .bind(block_id)
    .bind(score)
    .bind(time_spent_seconds)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to complete learning block: {e}"))?;

    xp::award_xp(
        proxy,
        user_id,
        xp::block_xp_amount(&block_type),
        "block_completion",
        Some("learning_block"),
        Some(block_id),
    )
    .await?;

    Ok(())
}

/// Completes the topic once every required block is done. The update is
/// conditional on `completed_at IS NULL`, so a concurrent double call awards
/// the completion bonus at most once.
pub async fn complete_topic(
    proxy: &Arc<DatabaseProxy>,
    user_id: &str,
    topic_id: &str,
    time_spent_seconds: i64,
) -> Result<(), String> {
    let pool = proxy.pool();

    let blocks = load_required_block_status(pool, user_id, topic_id).await?;
    let outstanding = outstanding_required_blocks(&blocks);
    if !outstanding.is_empty() {
        return Err(format!(
            "Complete all required learning blocks first ({} remaining: {})",
            outstanding.len(),
            outstanding.join(", ")
        ));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO topic_completions
          (user_id, topic_id, started_at, completed_at, completion_percentage, time_spent_seconds)
        VALUES ($1, $2, NOW(), NOW(), 100, $3)
        ON CONFLICT (user_id, topic_id) DO UPDATE
        SET completed_at = NOW(),
            completion_percentage = 100,
            time_spent_seconds = EXCLUDED.time_spent_seconds
        WHERE topic_completions.completed_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(topic_id)
    .bind(time_spent_seconds)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to complete topic: {e}"))?;

    if result.rows_affected() == 0 {
        return Err("Topic already completed".to_string());
    }

    xp::award_xp(
        proxy,
        user_id,
        xp::XP_TOPIC_COMPLETION,
        "topic_completion",
        Some("topic"),
        Some(topic_id),
    )
    .await?;

    // Achievement rules are best-effort and must not block completion.
    let achievements_proxy = Arc::clone(proxy);
    let achievements_user = user_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = achievements::check_achievements(&achievements_proxy, &achievements_user).await
        {
            warn!(error = %e, "achievement check failed");
        }
    });

    streak::update_streak(proxy, user_id).await?;

    Ok(())
}

async fn load_topic_completions(
    pool: &PgPool,
    user_id: &str,
) -> Result<HashMap<String, TopicCompletionInfo>, String> {
    let rows = sqlx::query(
        r#"
        SELECT topic_id, started_at, completed_at, completion_percentage, time_spent_seconds
        FROM topic_completions
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load topic completions: {e}"))?;

    let mut map = HashMap::new();
    for row in rows {
        let topic_id: String = row.try_get("topic_id").unwrap_or_default();
        map.insert(
            topic_id,
            TopicCompletionInfo {
                started_at: to_rfc3339(row.try_get("started_at").ok().flatten()),
                completed_at: to_rfc3339(row.try_get("completed_at").ok().flatten()),
                completion_percentage: row
                    .try_get::<i32, _>("completion_percentage")
                    .map(|v| v as i64)
                    .unwrap_or(0),
                time_spent_seconds: row
                    .try_get::<i32, _>("time_spent_seconds")
                    .map(|v| v as i64)
                    .unwrap_or(0),
            },
        );
    }
    Ok(map)
}

async fn load_blocks_with_completion(
    pool: &PgPool,
    user_id: &str,
    topic_id: &str,
) -> Result<Vec<LearningBlockInfo>, String> {
    let rows = sqlx::query(
        r#"
        SELECT
          b.id, b.block_type, b.position, b.required_for_completion,
          c.started_at, c.completed_at, c.score, c.time_spent_seconds
        FROM learning_blocks b
        LEFT JOIN learning_block_completions c
          ON c.learning_block_id = b.id AND c.user_id = $1
        WHERE b.topic_id = $2
        ORDER BY b.position ASC
        "#,
    )
    .bind(user_id)
    .bind(topic_id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load learning blocks: {e}"))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let started_at = to_rfc3339(row.try_get("started_at").ok().flatten());
            let completed_at = to_rfc3339(row.try_get("completed_at").ok().flatten());
            let has_completion = started_at.is_some() || completed_at.is_some();
            LearningBlockInfo {
                id: row.try_get("id").unwrap_or_default(),
                block_type: row.try_get("block_type").unwrap_or_default(),
                position: row.try_get::<i32, _>("position").map(|v| v as i64).unwrap_or(0),
                required_for_completion: row.try_get("required_for_completion").unwrap_or(false),
                completion: has_completion.then(|| BlockCompletionInfo {
                    started_at,
                    completed_at,
                    score: row.try_get::<Option<i32>, _>("score").ok().flatten().map(|v| v as i64),
                    time_spent_seconds: row
                        .try_get::<Option<i32>, _>("time_spent_seconds")
                        .ok()
                        .flatten()
                        .map(|v| v as i64)
                        .unwrap_or(0),
                }),
            }
        })
        .collect())
}

async fn load_required_block_status(
    pool: &PgPool,
    user_id: &str,
    topic_id: &str,
) -> Result<Vec<(String, bool, bool)>, String> {
    let rows = sqlx::query(
        r#"
        SELECT b.id, b.required_for_completion, c.completed_at
        FROM learning_blocks b
        LEFT JOIN learning_block_completions c
          ON c.learning_block_id = b.id AND c.user_id = $1
        WHERE b.topic_id = $2 AND b.required_for_completion = TRUE
        "#,
    )
    .bind(user_id)
    .bind(topic_id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load required blocks: {e}"))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.try_get("id").unwrap_or_default(),
                row.try_get("required_for_completion").unwrap_or(true),
                row.try_get::<Option<NaiveDateTime>, _>("completed_at")
                    .ok()
                    .flatten()
                    .is_some(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn prereqs(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_prerequisites_never_locks() {
        assert!(!is_topic_locked(&[], &set(&[])));
        assert!(!is_topic_locked(&[], &set(&["a", "b"])));
    }

    #[test]
    fn test_locked_until_all_prerequisites_complete() {
        let p = prereqs(&["a", "b"]);
        assert!(is_topic_locked(&p, &set(&[])));
        assert!(is_topic_locked(&p, &set(&["a"])));
        assert!(!is_topic_locked(&p, &set(&["a", "b"])));
        assert!(!is_topic_locked(&p, &set(&["a", "b", "c"])));
    }

    #[test]
    fn test_completion_order_does_not_matter() {
        let p = prereqs(&["a", "b", "c"]);
        assert!(!is_topic_locked(&p, &set(&["c", "a", "b"])));
        assert!(!is_topic_locked(&p, &set(&["b", "c", "a"])));
    }

    #[test]
    fn test_outstanding_required_blocks() {
        let blocks = vec![
            ("b1".to_string(), true, true),
            ("b2".to_string(), true, false),
            ("b3".to_string(), false, false),
            ("b4".to_string(), true, false),
        ];
        assert_eq!(outstanding_required_blocks(&blocks), vec!["b2", "b4"]);
    }

    #[test]
    fn test_all_required_blocks_done() {
        let blocks = vec![
            ("b1".to_string(), true, true),
            ("b2".to_string(), true, true),
        ];
        assert!(outstanding_required_blocks(&blocks).is_empty());
    }
}
