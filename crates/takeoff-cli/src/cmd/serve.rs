use crate::root::ConfigSource;
use anyhow::Context;
use takeoff_core::engine::TakeoffEngine;

pub fn run(source: &ConfigSource, port: Option<u16>) -> anyhow::Result<()> {
    let config = source.load()?;
    for w in config.validate() {
        tracing::warn!(level = ?w.level, "{}", w.message);
    }
    let port = port.unwrap_or(config.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let (engine, _ledger) =
            TakeoffEngine::open(config).context("failed to open takeoff engine")?;
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
            .await
            .with_context(|| format!("failed to bind port {port}"))?;

        tokio::select! {
            res = takeoff_server::serve_on(engine, listener) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
