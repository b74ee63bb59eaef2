mod config;

use anthropic_relay::{
    AppState, build_metrics_layer_and_handle, build_metrics_router, build_router,
    registry::{Registry, WatchedFile},
};
use clap::Parser as _;
use config::Config;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

#[tokio::main]
#[instrument]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse().validate()?;
    info!("Starting relay with config: {:?}", config);

    let registry = match &config.config {
        Some(path) => {
            let registry = Registry::from_config_file(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to load registry from config: {}", e))?;
            if config.watch {
                registry.receive_updates(WatchedFile(path.clone())).await?;
            }
            registry
        }
        None => Registry::default(),
    };
    if registry.callers.is_empty() {
        warn!("No callers configured; every call to /claude_proxy will be rejected");
    }

    let app_state = AppState::new(registry, config.upstream(), config.pool());
    let mut router = build_router(app_state, config.diagnostics);

    if config.metrics {
        let (prometheus_layer, handle) =
            build_metrics_layer_and_handle(config.metrics_prefix.clone());
        router = router.layer(prometheus_layer);

        let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
        let metrics_listener = TcpListener::bind(&metrics_addr).await?;
        info!("Metrics listening on {}", metrics_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, build_metrics_router(handle)).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Relay listening on {}", bind_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
