//! Persistence layer — libSQL-backed storage for wizard and calendar records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    App, CalendarCacheEntry, CalendarSubscription, Credential, Database, EventType, Membership,
    MembershipRole, SelectedCalendar, Team, User,
};
