use std::sync::Arc;

use electra_engine::GridEngine;
use electra_store::GridRepository;

use crate::config::ElectraConfig;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn GridRepository>,
    pub engine: Arc<dyn GridEngine>,
    pub config: Arc<ElectraConfig>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn GridRepository>,
        engine: Arc<dyn GridEngine>,
        config: ElectraConfig,
    ) -> Self {
        Self {
            repo,
            engine,
            config: Arc::new(config),
        }
    }
}
