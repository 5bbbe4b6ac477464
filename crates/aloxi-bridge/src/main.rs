//! Aloxi bridge binary.
//!
//! Usage: `aloxi-bridge [config-path]` (default `aloxi.yaml`).
//! - Builds every component, degrading instead of failing on unreachable peers
//! - Optional ops listener (`ops.listen`) for health and status
//! - Ctrl-C disconnects the transport and stops the workers

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use aloxi_bridge::{config, ops, transport::Connector, Bridge};

fn connector() -> Arc<dyn Connector> {
    #[cfg(feature = "mqtt")]
    {
        Arc::new(aloxi_bridge::transport::MqttConnector)
    }
    #[cfg(not(feature = "mqtt"))]
    {
        tracing::warn!("built without the mqtt feature, using the in-process bus");
        Arc::new(aloxi_bridge::transport::LocalBus::new())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "aloxi.yaml".to_string());
    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(%path, error = %e, "config load failed");
            return ExitCode::FAILURE;
        }
    };
    let listen = match cfg.ops.listen.as_deref().map(str::parse::<SocketAddr>).transpose() {
        Ok(listen) => listen,
        Err(e) => {
            tracing::error!(error = %e, "ops.listen must be a valid SocketAddr");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%path, "aloxi-bridge starting");
    let bridge = Bridge::start(cfg, connector()).await;

    let ops_task = match listen {
        Some(listen) => match tokio::net::TcpListener::bind(listen).await {
            Ok(listener) => {
                tracing::info!(%listen, "ops endpoint listening");
                let app = ops::build_router(bridge.status_consolidator().clone());
                Some(tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!(error = %e, "ops server failed");
                    }
                }))
            }
            Err(e) => {
                tracing::error!(%listen, error = %e, "ops bind failed");
                None
            }
        },
        None => None,
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "signal handler failed");
    }
    tracing::info!("shutting down");

    if let Some(task) = ops_task {
        task.abort();
    }
    bridge.shutdown().await;
    ExitCode::SUCCESS
}
