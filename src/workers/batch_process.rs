use std::sync::Arc;

use sqlx::Row;
use tracing::{info, warn};

use crate::db::DatabaseProxy;
use crate::services::llm_provider::LLMProvider;
use crate::services::productivity;

/// Sweeps users with pending screenshots and runs a batch for each. The
/// batch itself caps at 20 screenshots; users with more catch up on the
/// next tick.
pub async fn process_pending_batches(
    proxy: Arc<DatabaseProxy>,
    llm: Arc<LLMProvider>,
) -> Result<(), String> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT user_id
        FROM productivity_screenshots
        WHERE processed = FALSE
        "#,
    )
    .fetch_all(proxy.pool())
    .await
    .map_err(|e| format!("failed to list users with pending screenshots: {e}"))?;

    for row in rows {
        let user_id: String = row.try_get("user_id").unwrap_or_default();
        if user_id.is_empty() {
            continue;
        }
        match productivity::process_batch(&proxy, llm.as_ref(), false, &user_id).await {
            Ok(outcome) => {
                info!(
                    user_id,
                    batch_id = %outcome.batch_id,
                    processed = outcome.processed,
                    "scheduled batch processed"
                );
            }
            Err(e) => {
                warn!(user_id, error = %e, "scheduled batch failed");
            }
        }
    }

    Ok(())
}
