use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgod_reports::config::AppConfig;
use sgod_reports::database::Database;
use sgod_reports::handlers::{self, AppState};
use sgod_reports::notifications::{LogMailer, Mailer, NotificationService, RelayMailer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sgod_reports=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SGOD reports service");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::new(&config.database_url).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    if config.notifications.enabled {
        let mailer: Arc<dyn Mailer> = match &config.notifications.relay_url {
            Some(url) => Arc::new(RelayMailer::new(
                url.clone(),
                Duration::from_secs(config.notifications.relay_timeout_secs),
            )?),
            None => Arc::new(LogMailer),
        };
        let service = NotificationService::new(database.pool().clone(), mailer);
        let settings = config.notifications.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(settings.dispatch_interval_secs));
            loop {
                interval.tick().await;
                if let Err(e) = service
                    .send_all_pending(
                        Some(settings.batch_limit),
                        settings.retry_failed,
                        Some(settings.max_retries),
                    )
                    .await
                {
                    error!("Notification dispatch failed: {}", e);
                }
            }
        });
        info!(
            "Notification dispatcher started (every {}s)",
            config.notifications.dispatch_interval_secs
        );
    }

    let addr: SocketAddr = config.bind_address().parse()?;
    let app = handlers::router(AppState::new(database.pool().clone(), config));

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
