use std::sync::Arc;

use anyhow::Context;
use install_flow::calendar::{AvailabilityCache, CalendarWebhook, GoogleCalendarProvider};
use install_flow::config::ServiceConfig;
use install_flow::logging::init_logging;
use install_flow::server::build_router;
use install_flow::store::{Database, LibSqlBackend};
use install_flow::wizard::{HeaderSession, WizardRouteState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("Invalid configuration")?;
    let _logging = init_logging(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Install Flow starting");
    if config.webhook_token.is_none() {
        tracing::warn!("GOOGLE_WEBHOOK_TOKEN not set; calendar notifications will be rejected");
    }

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    tracing::info!(path = %config.db_path.display(), "Database ready");

    // ── Calendar ─────────────────────────────────────────────────────────
    let provider = Arc::new(GoogleCalendarProvider::new(config.provider_timeout)?);
    let cache = Arc::new(AvailabilityCache::new(
        Arc::clone(&db),
        provider,
        config.cache_ttl,
    ));
    let webhook = Arc::new(CalendarWebhook::new(
        Arc::clone(&db),
        cache,
        config.webhook_token.clone(),
    ));

    // ── Wizard ───────────────────────────────────────────────────────────
    let wizard = WizardRouteState {
        db: Arc::clone(&db),
        session: Arc::new(HeaderSession::new(&config.session_header)?),
        redirects: config.redirects.clone(),
    };

    let app = build_router(wizard, webhook);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
