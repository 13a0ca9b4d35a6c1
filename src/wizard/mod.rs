//! Installation wizard — step registry, resolver, context loading and the
//! redirect policy for failed requests.
//!
//! A request names a step and an app. The loader reads the caller's teams,
//! the app and the candidate event types; the resolver decides whether the
//! step is reachable and numbers it; any failure becomes a redirect.

pub mod loader;
pub mod model;
pub mod redirect;
pub mod resolver;
pub mod routes;
pub mod step;

pub use loader::{LoadedContext, load_context};
pub use model::{Candidates, StepDescriptor, StepPage, WizardContext};
pub use redirect::{RedirectOutcome, on_failure};
pub use resolver::resolve;
pub use routes::{HeaderSession, SessionProvider, WizardRouteState, wizard_routes};
pub use step::WizardStep;
