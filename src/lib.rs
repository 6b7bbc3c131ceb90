//! Live MJPEG streaming over HTTP
//!
//! A producer publishes encoded frames (or raw pixel buffers, with the
//! `encoder` feature) into a single-slot [`FrameStore`]; every connected client
//! receives the latest frame as a `multipart/x-mixed-replace` stream. The
//! server also answers a heartbeat route and serves a small viewer page. All
//! routes sit behind an unguessable path secret, and requests with the wrong
//! secret are dropped without a response.
//!
//! # Example
//! ```no_run
//! use streamserver::{ServerConfig, StreamServer};
//!
//! # async fn run() -> streamserver::Result<()> {
//! let server = StreamServer::new(ServerConfig::default())?;
//! let handle = server.start().await?;
//! println!("Open {}", handle.viewer_url());
//!
//! handle.publish(std::fs::read("frame.jpg")?);
//! # handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod frame;
pub mod http;
pub mod server;
pub mod session;
pub mod stats;
pub mod tls;

pub use error::{Error, Result};
pub use frame::{EncodeSettings, FrameEncoder, FrameStore, ImageFormat, PixelFormat, RawFrame};
#[cfg(feature = "encoder")]
pub use frame::ImageEncoder;
pub use http::{RejectReason, Route};
pub use server::{BoundAddress, Host, ServerConfig, ServerHandle, StreamHandler, StreamServer};
pub use stats::ServerStats;
pub use tls::{Provisioner, TlsConfig};
