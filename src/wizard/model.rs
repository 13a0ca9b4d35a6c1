//! The per-request context and the page payload.

use serde::Serialize;

use super::step::WizardStep;

/// Per-request wizard context. Built by the loader, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardContext {
    pub has_teams: bool,
    pub is_oauth_app: bool,
    pub team_id: Option<i64>,
    pub user_id: i64,
    pub app_slug: String,
}

/// What the resolver needs beyond the context.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    /// Ids of teams the caller has an accepted membership in.
    pub team_ids: Vec<i64>,
    /// Event types the app can be installed on, highest position first.
    pub event_types: Vec<EventTypeOption>,
}

/// A resolved step, ready for the page layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDescriptor {
    pub step: WizardStep,
    pub title: String,
    pub description: String,
    pub ordinal: usize,
    pub total_steps: usize,
}

/// App header shown on every wizard page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    pub slug: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub is_oauth: bool,
}

/// An account the app can be installed on: the caller or one of their teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountOption {
    pub id: i64,
    pub name: String,
    pub logo_url: Option<String>,
    pub is_team: bool,
    pub already_installed: bool,
}

/// An event type the app can be enabled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTypeOption {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub length_minutes: i64,
    pub position: i64,
    pub team_id: Option<i64>,
}

/// JSON body returned for a successfully resolved wizard step.
#[derive(Debug, Clone, Serialize)]
pub struct StepPage {
    pub step: StepDescriptor,
    pub app: AppSummary,
    pub steps: Vec<WizardStep>,
    pub team_id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<AccountOption>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<EventTypeOption>,
}
