use axum::Router;
use clap::Args;
use safekeep_backup::{configure_routes, create_backup_app_state, BackupApiDoc, RetentionSweeper};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::context::{AppContext, ConnectionArgs};

#[derive(Args)]
pub struct ServeCommand {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Address to bind the HTTP API to
    #[arg(long, default_value = "127.0.0.1:8080", env = "SAFEKEEP_ADDRESS")]
    address: String,

    /// Seconds between retention sweeps
    #[arg(long, env = "SAFEKEEP_RETENTION_INTERVAL")]
    retention_interval: Option<u64>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let mut config = self.connection.server_config();
        if let Some(secs) = self.retention_interval {
            config = config.with_retention_interval_secs(secs);
        }
        let ctx = AppContext::build(config).await?;

        // Nothing can still be running from a previous process
        let backups = ctx.backups.fail_interrupted().await?;
        let restores = ctx.restores.fail_interrupted().await?;
        if backups + restores > 0 {
            warn!(backups, restores, "Recovered operations interrupted by the last shutdown");
        }

        let cancellation_token = CancellationToken::new();
        let sweeper = RetentionSweeper::new(
            ctx.db.clone(),
            ctx.backups.clone(),
            Duration::from_secs(ctx.config.retention_interval_secs.max(1)),
        );
        let sweeper_token = cancellation_token.clone();
        let sweeper_handle = tokio::spawn(async move {
            debug!("Starting retention sweeper");
            sweeper.run(sweeper_token).await;
        });

        let app = build_router(&ctx);
        let listener = TcpListener::bind(&self.address).await?;
        info!(
            address = %self.address,
            data_dir = %ctx.config.data_dir.display(),
            "Safekeep API listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancellation_token.clone()))
            .await?;

        cancellation_token.cancel();
        if let Err(e) = sweeper_handle.await {
            error!("Retention sweeper task failed: {}", e);
        }
        info!("Safekeep API exited");
        Ok(())
    }
}

fn build_router(ctx: &AppContext) -> Router {
    let state = create_backup_app_state(
        ctx.backups.clone(),
        ctx.restores.clone(),
        ctx.configs.clone(),
    );
    Router::new()
        .merge(configure_routes().with_state(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", BackupApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    cancellation_token.cancelled().await;
                }
            }
        }
        _ = cancellation_token.cancelled() => {}
    }
    cancellation_token.cancel();
}
