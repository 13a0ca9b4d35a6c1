//! Step registry — the closed set of wizard steps and their numbering.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// The steps of the installation wizard, in fixed order.
///
/// Accounts → Connect → EventTypes. Accounts only applies to callers with
/// teams, Connect only to OAuth apps; EventTypes always applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WizardStep {
    Accounts,
    Connect,
    EventTypes,
}

impl WizardStep {
    /// All steps in wizard order.
    pub const ALL: [WizardStep; 3] = [Self::Accounts, Self::Connect, Self::EventTypes];

    /// Wire name used in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Connect => "connect",
            Self::EventTypes => "event-types",
        }
    }

    /// Whether this step is part of the wizard for the given flags.
    pub fn is_applicable(&self, has_teams: bool, is_oauth: bool) -> bool {
        match self {
            Self::Accounts => has_teams,
            Self::Connect => is_oauth,
            Self::EventTypes => true,
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WizardStep {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accounts" => Ok(Self::Accounts),
            "connect" => Ok(Self::Connect),
            "event-types" => Ok(Self::EventTypes),
            other => Err(ResolutionError::UnknownStep {
                step: other.to_string(),
            }),
        }
    }
}

/// Display text for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepText {
    pub title: String,
    pub description: String,
}

/// Title and description for `step`, interpolated with the app name.
pub fn describe(step: WizardStep, app_name: &str) -> StepText {
    let (title, description) = match step {
        WizardStep::Accounts => (
            "Select Account".to_string(),
            format!("Install {app_name} on your personal account or on a team account."),
        ),
        WizardStep::Connect => (
            format!("Connect {app_name}"),
            format!("Authorize {app_name} to access your account."),
        ),
        WizardStep::EventTypes => (
            "Select Event Type".to_string(),
            format!("On which event type do you want to install {app_name}?"),
        ),
    };
    StepText { title, description }
}

/// Zero-based position of `step` among the applicable steps.
///
/// Counts the applicable steps that come strictly before `step`.
pub fn ordinal(step: WizardStep, has_teams: bool, is_oauth: bool) -> usize {
    WizardStep::ALL
        .iter()
        .take_while(|s| **s < step)
        .filter(|s| s.is_applicable(has_teams, is_oauth))
        .count()
}

/// Applicable steps in wizard order.
pub fn active_steps(has_teams: bool, is_oauth: bool) -> Vec<WizardStep> {
    WizardStep::ALL
        .into_iter()
        .filter(|s| s.is_applicable(has_teams, is_oauth))
        .collect()
}

/// Number of applicable steps.
pub fn total_steps(has_teams: bool, is_oauth: bool) -> usize {
    active_steps(has_teams, is_oauth).len()
}

/// First applicable step. EventTypes always applies, so there is one.
pub fn entry_step(has_teams: bool, is_oauth: bool) -> WizardStep {
    active_steps(has_teams, is_oauth)
        .first()
        .copied()
        .unwrap_or(WizardStep::EventTypes)
}
