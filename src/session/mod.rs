//! Per-connection session tracking

pub mod context;
pub mod state;

pub use context::ConnectionContext;
pub use state::{ConnectionPhase, ConnectionState};
