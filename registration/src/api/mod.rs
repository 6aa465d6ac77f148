//! API endpoints for the registration service.
//!
//! Handlers are organized by audience:
//! - Public: events, notices, open/closed state
//! - Applications: submit, lookup, edit and cancel by the registrant
//! - Admin: sign-in, listing, dashboard, settings, removal, export, live feed

pub mod admin;
pub mod applications;
pub mod public;

pub use applications::{amend, cancel, lookup, submit};
pub use public::{get_event, get_settings, list_events, list_notices};
