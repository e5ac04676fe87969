mod batch_process;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::db::DatabaseProxy;
use crate::services::llm_provider::LLMProvider;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    db_proxy: Arc<DatabaseProxy>,
    llm: Arc<LLMProvider>,
}

impl WorkerManager {
    pub async fn new(
        db_proxy: Arc<DatabaseProxy>,
        llm: Arc<LLMProvider>,
    ) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            db_proxy,
            llm,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        let leader = std::env::var("WORKER_LEADER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if !leader {
            info!("WORKER_LEADER not set, skipping worker startup");
            return Ok(());
        }

        info!("Starting workers (leader mode)");

        let enable_batch_process = std::env::var("ENABLE_BATCH_PROCESS_WORKER")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let scheduler = self.scheduler.lock().await;

        if enable_batch_process {
            let schedule = std::env::var("BATCH_PROCESS_SCHEDULE")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string());
            let db = Arc::clone(&self.db_proxy);
            let llm = Arc::clone(&self.llm);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(&schedule, move |_uuid, _lock| {
                let db = Arc::clone(&db);
                let llm = Arc::clone(&llm);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = batch_process::process_pending_batches(db, llm) => {
                            if let Err(e) = result {
                                error!(error = %e, "Batch process worker error");
                            }
                        }
                    }
                })
            })?;
            scheduler.add(job).await?;
            info!(schedule = %schedule, "Batch process worker scheduled");
        }

        scheduler.start().await?;
        Ok(())
    }

    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            error!(error = %e, "failed to shut down worker scheduler");
        }
    }
}
