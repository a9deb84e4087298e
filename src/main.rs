mod bot;
mod broadcast;
mod config;
mod error;
mod metrics;
mod monitor;
mod source;
mod state;
mod transport;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bot::engine::Engine;
use bot::render::render_gold_rate;
use config::Config;
use source::adapters::treasury::TreasurySource;
use transport::adapters::console::ConsoleTransport;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);
    metrics::init_metrics_server(config.metrics_port)?;

    info!(metrics_port = config.metrics_port, "price-broadcaster starting");

    let source = Arc::new(TreasurySource::new(config.source_url.clone(), config.source_timeout)?);
    source.warm_up().await;

    let transport = Arc::new(ConsoleTransport::new());
    let mut engine = Engine::new(&config, source, transport, render_gold_rate);

    tokio::select! {
        res = engine.run() => {
            match res {
                Ok(()) => warn!("engine exited"),
                Err(err) => {
                    error!(error = %err, "engine stopped");
                    return Err(err.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
