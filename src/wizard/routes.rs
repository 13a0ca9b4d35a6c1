//! HTTP endpoint for the installation wizard.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use regex::Regex;
use tracing::{debug, info};

use crate::config::RedirectPaths;
use crate::error::{ConfigError, WizardFailure};
use crate::store::Database;

use super::loader::load_context;
use super::model::StepPage;
use super::redirect::on_failure;
use super::resolver::resolve;
use super::step::{self, WizardStep};

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid slug pattern"));

/// Session collaborator: who is making the request.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The authenticated user id, or `None` when there is no session.
    async fn current_user(&self, headers: &HeaderMap) -> Option<i64>;
}

/// Reads the user id from a header set by an authenticating proxy.
pub struct HeaderSession {
    header: HeaderName,
}

impl HeaderSession {
    pub fn new(header: &str) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "INSTALL_FLOW_SESSION_HEADER".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(Self { header })
    }
}

#[async_trait]
impl SessionProvider for HeaderSession {
    async fn current_user(&self, headers: &HeaderMap) -> Option<i64> {
        headers
            .get(&self.header)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
            .filter(|id: &i64| *id > 0)
    }
}

/// Shared state for wizard routes.
#[derive(Clone)]
pub struct WizardRouteState {
    pub db: Arc<dyn Database>,
    pub session: Arc<dyn SessionProvider>,
    pub redirects: RedirectPaths,
}

/// Build the wizard routes.
pub fn wizard_routes(state: WizardRouteState) -> Router {
    Router::new()
        .route("/apps/installation/{step}", get(show_step))
        .with_state(state)
}

/// GET /apps/installation/{step}?slug=..&teamId=..
///
/// Returns the step page as JSON, or redirects when the step cannot be
/// shown to this caller.
async fn show_step(
    State(state): State<WizardRouteState>,
    Path(requested): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match build_page(&state, &requested, &query, &headers).await {
        Ok(page) => {
            debug!(step = %page.step.step, app = %page.app.slug, "Wizard step resolved");
            Json(page).into_response()
        }
        Err(failure) => {
            let outcome = on_failure(&failure, &state.redirects);
            info!(
                step = %requested,
                error = %failure,
                destination = %outcome.destination,
                "Wizard step redirected"
            );
            outcome.into_response()
        }
    }
}

async fn build_page(
    state: &WizardRouteState,
    requested: &str,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<StepPage, WizardFailure> {
    let user_id = state
        .session
        .current_user(headers)
        .await
        .ok_or(WizardFailure::Unauthenticated)?;

    let app_slug = parse_slug(query.get("slug").map(String::as_str))?;
    let team_id = parse_team_id(query.get("teamId").map(String::as_str))?;

    let loaded = load_context(state.db.as_ref(), user_id, app_slug, team_id).await?;
    let descriptor = resolve(
        requested,
        &loaded.context,
        &loaded.candidates,
        &loaded.app.name,
    )?;

    let step = descriptor.step;
    let steps = step::active_steps(loaded.context.has_teams, loaded.context.is_oauth_app);
    Ok(StepPage {
        step: descriptor,
        app: loaded.app,
        steps,
        team_id,
        accounts: if step == WizardStep::Accounts {
            loaded.accounts
        } else {
            Vec::new()
        },
        event_types: if step == WizardStep::EventTypes {
            loaded.candidates.event_types
        } else {
            Vec::new()
        },
    })
}

fn parse_slug(raw: Option<&str>) -> Result<&str, WizardFailure> {
    let slug = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        WizardFailure::InvalidInput {
            field: "slug".to_string(),
            reason: "missing".to_string(),
        }
    })?;
    if !SLUG_PATTERN.is_match(slug) {
        return Err(WizardFailure::InvalidInput {
            field: "slug".to_string(),
            reason: format!("{slug:?} is not a valid app slug"),
        });
    }
    Ok(slug)
}

fn parse_team_id(raw: Option<&str>) -> Result<Option<i64>, WizardFailure> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(WizardFailure::InvalidInput {
            field: "teamId".to_string(),
            reason: format!("{raw:?} is not a positive integer"),
        }),
    }
}
