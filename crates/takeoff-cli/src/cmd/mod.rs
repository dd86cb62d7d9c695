pub mod config;
pub mod project;
pub mod serve;
pub mod setup;
pub mod tools;
pub mod version;

use crate::root::ConfigSource;
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use takeoff_core::engine::TakeoffEngine;

/// Run `f` against an engine wired from config, then wait for queued ledger
/// events to be applied before returning.
pub fn with_engine<T, F, Fut>(source: &ConfigSource, f: F) -> anyhow::Result<T>
where
    F: FnOnce(Arc<TakeoffEngine>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let config = source.load()?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (engine, ledger) =
            TakeoffEngine::open(config).context("failed to open takeoff engine")?;
        let engine = Arc::new(engine);
        let result = f(engine.clone()).await;
        drop(engine);
        if let Err(e) = ledger.await {
            tracing::warn!(error = %e, "ledger worker ended abnormally");
        }
        result
    })
}
