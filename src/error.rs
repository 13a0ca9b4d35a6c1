//! Error types for the install-flow service.

use std::time::Duration;

use crate::wizard::step::WizardStep;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Why a known step cannot be reached for the current caller and app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachableReason {
    /// The caller belongs to no accepted team, so there is no account to pick.
    NoTeams,
    /// The app has no OAuth flow, so there is nothing to connect.
    NotOAuth,
}

impl std::fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTeams => write!(f, "caller has no accepted teams"),
            Self::NotOAuth => write!(f, "app does not use OAuth"),
        }
    }
}

/// Step resolution errors. Produced by the resolver, never by I/O.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Unknown wizard step: {step}")]
    UnknownStep { step: String },

    #[error("Step {step} is unreachable for app {app_slug}: {reason}")]
    StepUnreachable {
        step: WizardStep,
        reason: UnreachableReason,
        app_slug: String,
        /// First applicable step of the wizard for the same context.
        entry: WizardStep,
    },

    #[error("No event types available to install {app_slug} on")]
    NoEventTypes { app_slug: String },

    #[error("Team {team_id} is not one of the caller's accepted teams")]
    ForbiddenTeam { team_id: i64 },
}

/// Every way a wizard request can fail before a page is produced.
#[derive(Debug, thiserror::Error)]
pub enum WizardFailure {
    #[error("Caller is not authenticated")]
    Unauthenticated,

    #[error("User {user_id} not found")]
    UserNotFound { user_id: i64 },

    #[error("App {slug} not found")]
    AppNotFound { slug: String },

    #[error("App {slug} is not enabled")]
    AppNotEnabled { slug: String },

    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Calendar provider errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Credential {credential_id} has no usable access token")]
    InvalidCredential { credential_id: i64 },

    #[error("Cache write failed: {0}")]
    Cache(#[from] DatabaseError),
}

/// Calendar push-notification webhook errors.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Invalid channel token")]
    Forbidden,

    #[error("No subscription for channel {channel_id}")]
    SubscriptionNotFound { channel_id: String },

    #[error("Credential for channel {channel_id} not found")]
    CredentialNotFound { channel_id: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
