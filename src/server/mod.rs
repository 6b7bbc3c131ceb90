//! Stream server
//!
//! `StreamServer` owns the configuration; `start` binds the listener and
//! returns a `ServerHandle` that producers publish through and that stops the
//! server when it is stopped or dropped.

pub mod address;
pub mod config;
pub(crate) mod connection;
pub mod handler;
pub mod listener;
pub mod secret;

use std::sync::Arc;

pub use address::BoundAddress;
pub use config::{Host, ServerConfig};
pub use handler::{NoopHandler, StreamHandler};
pub use listener::{ServerHandle, StreamServer};

use crate::frame::FrameStore;
use crate::stats::ServerMetrics;

/// State shared by the accept loop and every connection worker
///
/// Immutable apart from the frame store and the counters.
pub(crate) struct SharedState {
    pub(crate) config: ServerConfig,
    pub(crate) secret: String,
    pub(crate) url: String,
    pub(crate) frames: Arc<FrameStore>,
    pub(crate) metrics: Arc<ServerMetrics>,
}

impl SharedState {
    #[cfg(test)]
    pub(crate) fn new(config: ServerConfig, secret: String, url: String) -> Self {
        let frames = Arc::new(FrameStore::with_placeholder(config.placeholder_frame.clone()));
        Self::with_frames(config, secret, url, frames)
    }

    pub(crate) fn with_frames(
        config: ServerConfig,
        secret: String,
        url: String,
        frames: Arc<FrameStore>,
    ) -> Self {
        Self {
            config,
            secret,
            url,
            frames,
            metrics: Arc::new(ServerMetrics::new()),
        }
    }
}
