//! Install Flow — app installation wizard and calendar availability webhook.

pub mod calendar;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;
pub mod wizard;
