//! HTTP request handlers shared by every Roster service.

pub mod health;
pub mod live;

// Re-export common handler utilities
pub use health::{check_documents, health_check, readiness};
pub use live::{WsMessage, stream_snapshots};
