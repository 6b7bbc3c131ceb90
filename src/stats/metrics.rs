//! Statistics and metrics for the stream server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::http::Route;

/// Live counters shared by the listener and every connection worker
#[derive(Debug)]
pub struct ServerMetrics {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    rejected_requests: AtomicU64,
    stream_requests: AtomicU64,
    ping_requests: AtomicU64,
    viewer_requests: AtomicU64,
    bytes_sent: AtomicU64,
    frames_sent: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            stream_requests: AtomicU64::new(0),
            ping_requests: AtomicU64::new(0),
            viewer_requests: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Record an accepted socket
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a worker exit
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a dropped request
    pub fn request_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a routed request
    pub fn request_routed(&self, route: Route) {
        let counter = match route {
            Route::Stream => &self.stream_requests,
            Route::Ping => &self.ping_requests,
            Route::Viewer => &self.viewer_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Current number of open connections
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Take a point-in-time copy of all counters
    pub fn snapshot(&self, frames_published: u64) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            stream_requests: self.stream_requests.load(Ordering::Relaxed),
            ping_requests: self.ping_requests.load(Ordering::Relaxed),
            viewer_requests: self.viewer_requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_published,
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Currently open connections
    pub active_connections: u64,
    /// Requests dropped for a bad request line or wrong secret
    pub rejected_requests: u64,
    /// Stream route requests
    pub stream_requests: u64,
    /// Ping route requests
    pub ping_requests: u64,
    /// Viewer route requests
    pub viewer_requests: u64,
    /// Total bytes written to clients
    pub bytes_sent: u64,
    /// Frames written to clients, summed over all streams
    pub frames_sent: u64,
    /// Frames published by the producer
    pub frames_published: u64,
    /// Time since the server started
    pub uptime: Duration,
}

impl ServerStats {
    /// Average outbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}
