use std::sync::Arc;
use takeoff_core::engine::TakeoffEngine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TakeoffEngine>,
}

impl AppState {
    pub fn new(engine: TakeoffEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_core::config::TakeoffConfig;
    use takeoff_core::testing::{MemoryProjectStore, MemorySpreadsheet};

    #[test]
    fn clones_share_one_engine() {
        let engine = TakeoffEngine::new(
            TakeoffConfig::default(),
            Arc::new(MemorySpreadsheet::new("s1")),
            Arc::new(MemoryProjectStore::new()),
        );
        let state = AppState::new(engine);
        let copy = state.clone();
        assert!(Arc::ptr_eq(&state.engine, &copy.engine));
    }
}
