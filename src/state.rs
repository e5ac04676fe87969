use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::db::DatabaseProxy;
use crate::services::llm_provider::LLMProvider;

/// Runtime toggles adjustable without a restart. `llm_mock` forces the
/// productivity summarizer onto its deterministic fallback.
#[derive(Debug)]
pub struct RuntimeConfig {
    pub llm_enabled: AtomicBool,
    pub llm_mock: AtomicBool,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self {
            llm_enabled: AtomicBool::new(true),
            llm_mock: AtomicBool::new(false),
        }
    }

    pub fn is_llm_enabled(&self) -> bool {
        self.llm_enabled.load(Ordering::Relaxed)
    }

    pub fn is_llm_mock(&self) -> bool {
        self.llm_mock.load(Ordering::Relaxed)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    db_proxy: Option<Arc<DatabaseProxy>>,
    llm: Arc<LLMProvider>,
    runtime: Arc<RuntimeConfig>,
}

impl AppState {
    pub fn new(db_proxy: Option<Arc<DatabaseProxy>>) -> Self {
        Self {
            started_at: Instant::now(),
            db_proxy,
            llm: Arc::new(LLMProvider::from_env()),
            runtime: Arc::new(RuntimeConfig::new()),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn llm(&self) -> Arc<LLMProvider> {
        Arc::clone(&self.llm)
    }

    pub fn runtime(&self) -> Arc<RuntimeConfig> {
        Arc::clone(&self.runtime)
    }
}
