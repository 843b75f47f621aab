use std::time::Duration;

use deliberation::{DeliberationConfig, DeliberationEngine};

#[derive(Clone)]
pub struct AppState {
    pub engine: DeliberationEngine,
    /// Wall-clock ceiling per session.
    pub budget: Duration,
}

impl AppState {
    pub fn new(engine: DeliberationEngine) -> Self {
        let budget = engine.config().session_budget();
        Self { engine, budget }
    }

    pub fn from_config(config: DeliberationConfig) -> Self {
        Self::new(DeliberationEngine::from_config(config))
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }
}
