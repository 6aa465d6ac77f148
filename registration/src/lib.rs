//! Event registration with a capacity limit and a waitlist.
//!
//! Registrants submit a form for an event. While the registration list is
//! below capacity the record lands there; beyond it the record is appended
//! to the waitlist. A cancellation from the registration list promotes the
//! head of the waitlist into the freed slot.
//!
//! # Architecture
//!
//! ```text
//! HTTP (axum) ──► RosterWorkflows ──► Store<Reducer> ──► effects ──► DocumentStore
//!     │                                                                   ▲
//!     ├──────────► RosterQueries (lookup, listing, dashboard) ────────────┤
//!     └──────────► RosterFeed (subscriptions → WebSocket) ────────────────┘
//! ```
//!
//! Each write flow is a reducer:
//!
//! - [`workflows::registration`]: closed check, duplicate check, capacity routing
//! - [`workflows::cancellation`]: secret check, delete, waitlist promotion
//! - [`workflows::amendment`]: secret check, field update
//! - [`workflows::settings`]: lazy singleton, open/closed toggle, capacity
//!
//! The document store is either `PostgreSQL` (`roster-postgres`) or the
//! in-memory store from `roster-testing`.
//!
//! # Usage
//!
//! See [`server::build_router`] for the HTTP surface and the `server`
//! binary for wiring.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod live;
pub mod queries;
pub mod repository;
pub mod secret;
pub mod server;
pub mod types;
pub mod validation;
pub mod workflows;

pub use config::Config;
pub use error::RosterError;
pub use repository::RosterRepository;
pub use server::{AppState, StateOptions, build_router};
pub use types::*;
pub use workflows::{RosterWorkflows, Submission, WorkflowEnvironment};
