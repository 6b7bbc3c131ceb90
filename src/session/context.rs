//! Handler context
//!
//! Read-only connection information passed to `StreamHandler` callbacks.

use std::net::SocketAddr;

/// Context passed to StreamHandler callbacks
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Unique connection ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Whether the connection is TLS-wrapped
    pub secure: bool,
}

impl ConnectionContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: SocketAddr, secure: bool) -> Self {
        Self {
            session_id,
            peer_addr,
            secure,
        }
    }
}
