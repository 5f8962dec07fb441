use std::path::PathBuf;
use std::sync::Arc;

use luna_common::{Error, Result};
use luna_config::AppConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::bootstrap::build_state;
use crate::router::build_router;

/// The gateway server: opens the store, binds the port and serves the API.
pub struct GatewayServer {
    config: AppConfig,
    config_dir: PathBuf,
}

impl GatewayServer {
    pub fn new(config: AppConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_dir: config_dir.into(),
        }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);

        let state = Arc::new(build_state(self.config, &self.config_dir)?);
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("Luna gateway listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))?;

        info!("gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
