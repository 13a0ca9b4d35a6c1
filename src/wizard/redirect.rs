//! Redirect policy — where a failed wizard request sends the caller.

use axum::response::{IntoResponse, Redirect, Response};

use crate::config::RedirectPaths;
use crate::error::{ResolutionError, UnreachableReason, WizardFailure};

/// Terminal outcome of a failed wizard request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectOutcome {
    pub destination: String,
    pub permanent: bool,
}

impl RedirectOutcome {
    fn temporary(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            permanent: false,
        }
    }
}

impl IntoResponse for RedirectOutcome {
    fn into_response(self) -> Response {
        if self.permanent {
            Redirect::permanent(&self.destination).into_response()
        } else {
            Redirect::temporary(&self.destination).into_response()
        }
    }
}

/// Map a failure to its destination. Every variant is listed; nothing
/// falls through silently except to the catalog.
pub fn on_failure(failure: &WizardFailure, paths: &RedirectPaths) -> RedirectOutcome {
    match failure {
        WizardFailure::Unauthenticated | WizardFailure::UserNotFound { .. } => {
            RedirectOutcome::temporary(&paths.login)
        }
        WizardFailure::AppNotFound { .. } | WizardFailure::AppNotEnabled { .. } => {
            RedirectOutcome::temporary(&paths.catalog)
        }
        WizardFailure::InvalidInput { .. } => RedirectOutcome::temporary(&paths.catalog),
        WizardFailure::Resolution(err) => on_resolution_error(err, paths),
        WizardFailure::Database(_) => RedirectOutcome::temporary(&paths.catalog),
    }
}

fn on_resolution_error(err: &ResolutionError, paths: &RedirectPaths) -> RedirectOutcome {
    match err {
        ResolutionError::StepUnreachable {
            reason: UnreachableReason::NoTeams,
            app_slug,
            entry,
            ..
        } => RedirectOutcome::temporary(format!(
            "{}/{}?slug={}",
            paths.installation, entry, app_slug
        )),
        ResolutionError::StepUnreachable {
            reason: UnreachableReason::NotOAuth,
            ..
        } => RedirectOutcome::temporary(&paths.catalog),
        ResolutionError::ForbiddenTeam { .. } => RedirectOutcome::temporary(&paths.catalog),
        ResolutionError::NoEventTypes { .. } => RedirectOutcome::temporary(&paths.installed),
        ResolutionError::UnknownStep { .. } => RedirectOutcome::temporary(&paths.catalog),
    }
}
