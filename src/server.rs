//! HTTP surface: wizard pages, calendar webhook and health check on one
//! router.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::calendar::{CalendarWebhook, webhook_routes};
use crate::wizard::{WizardRouteState, wizard_routes};

/// Assemble every route served by the service.
pub fn build_router(wizard: WizardRouteState, webhook: Arc<CalendarWebhook>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(wizard_routes(wizard))
        .merge(webhook_routes(webhook))
        .layer(TraceLayer::new_for_http())
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "install-flow",
    }))
}
