//! Connection state machine
//!
//! Tracks a connection from accept to close:
//! `ReadingRequest -> Routing -> {Streaming | Ponging | ServingViewer} -> Closed`.
//! Any phase may jump straight to `Closed`.

use std::net::SocketAddr;
use std::time::Instant;

use crate::http::Route;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Reading until the header terminator
    ReadingRequest,
    /// Header block complete, classifying the request line
    Routing,
    /// Writing multipart frames
    Streaming,
    /// Writing heartbeat lines
    Ponging,
    /// Writing the viewer page
    ServingViewer,
    /// Socket closed
    Closed,
}

/// Complete connection state
#[derive(Debug)]
pub struct ConnectionState {
    /// Unique connection ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: ConnectionPhase,

    /// Accept time
    pub connected_at: Instant,

    /// Route chosen for the request, if it was accepted
    pub route: Option<Route>,

    /// Request bytes read
    pub bytes_received: u64,

    /// Response bytes written
    pub bytes_sent: u64,

    /// Frames written (stream route only)
    pub frames_sent: u64,
}

impl ConnectionState {
    /// Create a new connection state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: ConnectionPhase::ReadingRequest,
            connected_at: Instant::now(),
            route: None,
            bytes_received: 0,
            bytes_sent: 0,
            frames_sent: 0,
        }
    }

    /// Header block fully read
    pub fn request_complete(&mut self) {
        if self.phase == ConnectionPhase::ReadingRequest {
            self.phase = ConnectionPhase::Routing;
        }
    }

    /// Request accepted; enter the route's response phase
    pub fn on_route(&mut self, route: Route) {
        if self.phase != ConnectionPhase::Routing {
            return;
        }

        self.route = Some(route);
        self.phase = match route {
            Route::Stream => ConnectionPhase::Streaming,
            Route::Ping => ConnectionPhase::Ponging,
            Route::Viewer => ConnectionPhase::ServingViewer,
        };
    }

    /// Close from any phase, returning the phase the connection was in
    pub fn close(&mut self) -> ConnectionPhase {
        std::mem::replace(&mut self.phase, ConnectionPhase::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.phase == ConnectionPhase::Closed
    }

    /// Get connection duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
