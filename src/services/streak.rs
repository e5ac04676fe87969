use chrono::{Duration, NaiveDate, Utc};
use sqlx::Row;

use crate::db::DatabaseProxy;
use crate::services::xp;

/// Outcome of applying one day of activity to a streak counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakTransition {
    pub streak_days: i64,
    /// False when today was already counted.
    pub changed: bool,
}

impl StreakTransition {
    /// The weekly bonus fires every time the counter lands on exactly 7,
    /// once per 7-day cycle.
    pub fn earns_weekly_bonus(&self) -> bool {
        self.changed && self.streak_days == 7
    }
}

/// Pure streak state machine: no record starts at 1, yesterday extends,
/// today is a no-op, any larger gap resets to 1.
pub fn next_streak(
    last_activity: Option<NaiveDate>,
    streak_days: i64,
    today: NaiveDate,
) -> StreakTransition {
    let yesterday = today - Duration::days(1);

    match last_activity {
        None => StreakTransition {
            streak_days: 1,
            changed: true,
        },
        Some(last) if last == yesterday => StreakTransition {
            streak_days: streak_days + 1,
            changed: true,
        },
        Some(last) if last == today => StreakTransition {
            streak_days,
            changed: false,
        },
        Some(_) => StreakTransition {
            streak_days: 1,
            changed: true,
        },
    }
}

/// Applies today's activity to `user_levels` and pays the weekly bonus when
/// a cycle lands on 7.
pub async fn update_streak(proxy: &DatabaseProxy, user_id: &str) -> Result<StreakTransition, String> {
    let pool = proxy.pool();
    let today = Utc::now().date_naive();

    let row = sqlx::query(
        r#"SELECT last_activity_date, streak_days FROM user_levels WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| format!("failed to load streak: {e}"))?;

    let (last_activity, streak_days) = match &row {
        Some(row) => (
            row.try_get::<Option<NaiveDate>, _>("last_activity_date")
                .map_err(|e| format!("failed to read streak row: {e}"))?,
            row.try_get::<i64, _>("streak_days").unwrap_or(0),
        ),
        None => (None, 0),
    };

    let transition = next_streak(last_activity, streak_days, today);

    sqlx::query(
        r#"
        INSERT INTO user_levels (user_id, total_xp, last_activity_date, streak_days)
        VALUES ($1, 0, $2, $3)
        ON CONFLICT (user_id) DO UPDATE
        SET last_activity_date = EXCLUDED.last_activity_date,
            streak_days = EXCLUDED.streak_days
        "#,
    )
    .bind(user_id)
    .bind(today)
    .bind(transition.streak_days)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to update streak: {e}"))?;

    if transition.earns_weekly_bonus() {
        xp::award_xp(
            proxy,
            user_id,
            xp::XP_WEEKLY_STREAK,
            "weekly_streak",
            None,
            None,
        )
        .await?;
    }

    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_activity_starts_at_one() {
        let t = next_streak(None, 0, day(2026, 8, 27));
        assert_eq!(t.streak_days, 1);
        assert!(t.changed);
    }

    #[test]
    fn test_consecutive_day_extends() {
        let t = next_streak(Some(day(2026, 8, 26)), 3, day(2026, 8, 27));
        assert_eq!(t.streak_days, 4);
        assert!(t.changed);
    }

    #[test]
    fn test_same_day_is_noop() {
        let t = next_streak(Some(day(2026, 8, 27)), 5, day(2026, 8, 27));
        assert_eq!(t.streak_days, 5);
        assert!(!t.changed);
        assert!(!t.earns_weekly_bonus());
    }

    #[test]
    fn test_gap_resets_to_one() {
        let t = next_streak(Some(day(2026, 8, 24)), 12, day(2026, 8, 27));
        assert_eq!(t.streak_days, 1);
        assert!(t.changed);
    }

    #[test]
    fn test_weekly_bonus_on_exact_seven() {
        let t = next_streak(Some(day(2026, 8, 26)), 6, day(2026, 8, 27));
        assert_eq!(t.streak_days, 7);
        assert!(t.earns_weekly_bonus());

        let t = next_streak(Some(day(2026, 8, 26)), 7, day(2026, 8, 27));
        assert_eq!(t.streak_days, 8);
        assert!(!t.earns_weekly_bonus());
    }

    #[test]
    fn test_no_bonus_when_seven_already_counted_today() {
        let t = next_streak(Some(day(2026, 8, 27)), 7, day(2026, 8, 27));
        assert!(!t.earns_weekly_bonus());
    }
}
