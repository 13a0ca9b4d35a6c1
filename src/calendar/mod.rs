//! Calendar availability: provider client, cached availability windows and
//! the push-notification webhook that keeps them fresh.

pub mod cache;
pub mod provider;
pub mod webhook;
pub mod window;

pub use cache::AvailabilityCache;
pub use provider::{BusyInterval, CalendarProvider, GoogleCalendarProvider};
pub use webhook::{CalendarWebhook, webhook_routes};
pub use window::availability_window;
