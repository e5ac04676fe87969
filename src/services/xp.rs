use sqlx::PgPool;
use uuid::Uuid;

use crate::db::DatabaseProxy;

pub const XP_TOPIC_COMPLETION: i64 = 50;
pub const XP_WEEKLY_STREAK: i64 = 200;

/// XP for completing a learning block, keyed by block type. Unknown types
/// fall back to the theory amount.
pub fn block_xp_amount(block_type: &str) -> i64 {
    match block_type {
        "theory" => 10,
        "demo" => 15,
        "practice" => 25,
        "project" => 100,
        _ => 10,
    }
}

/// Appends a ledger entry and bumps the user's running total. The ledger is
/// append-only; totals live on `user_levels` so reads stay cheap.
pub async fn award_xp(
    proxy: &DatabaseProxy,
    user_id: &str,
    amount: i64,
    reason: &str,
    reference_type: Option<&str>,
    reference_id: Option<&str>,
) -> Result<(), String> {
    let pool = proxy.pool();
    insert_transaction(pool, user_id, amount, reason, reference_type, reference_id).await?;
    bump_total(pool, user_id, amount).await
}

async fn insert_transaction(
    pool: &PgPool,
    user_id: &str,
    amount: i64,
    reason: &str,
    reference_type: Option<&str>,
    reference_id: Option<&str>,
) -> Result<(), String> {
    sqlx::query(
        r#"
        INSERT INTO xp_transactions (id, user_id, amount, reason, reference_type, reference_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(amount)
    .bind(reason)
    .bind(reference_type)
    .bind(reference_id)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to record xp transaction: {e}"))?;
    Ok(())
}

async fn bump_total(pool: &PgPool, user_id: &str, amount: i64) -> Result<(), String> {
    sqlx::query(
        r#"
        INSERT INTO user_levels (user_id, total_xp, streak_days)
        VALUES ($1, $2, 0)
        ON CONFLICT (user_id) DO UPDATE SET total_xp = user_levels.total_xp + EXCLUDED.total_xp
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to update xp total: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_xp_amounts() {
        assert_eq!(block_xp_amount("theory"), 10);
        assert_eq!(block_xp_amount("demo"), 15);
        assert_eq!(block_xp_amount("practice"), 25);
        assert_eq!(block_xp_amount("project"), 100);
    }

    #[test]
    fn test_block_xp_unknown_type_defaults_to_theory() {
        assert_eq!(block_xp_amount("workshop"), 10);
        assert_eq!(block_xp_amount(""), 10);
    }
}
