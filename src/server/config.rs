//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

use crate::frame::{EncodeSettings, ImageFormat, PixelFormat};
use crate::tls::TlsConfig;

/// Default port, advanced upward when busy
pub const DEFAULT_PORT: u16 = 5000;

/// Host the server binds to and advertises in its URL
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Host {
    /// `localhost`
    #[default]
    Localhost,
    /// Local address of the outbound route to the public internet
    Global,
    /// Explicit hostname or IP literal
    Literal(String),
}

impl Host {
    /// Parse `"localhost"`, `"GLOBAL"` or a literal host
    pub fn parse(s: &str) -> Self {
        match s {
            "localhost" => Host::Localhost,
            "GLOBAL" => Host::Global,
            other => Host::Literal(other.to_string()),
        }
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host::parse(s)
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: Host,

    /// Requested port
    pub port: u16,

    /// Try successive ports when the requested one is in use
    pub next_free_port: bool,

    /// Serve over TLS when set
    pub tls: Option<TlsConfig>,

    /// URL path secret (generated when None)
    pub secret: Option<String>,

    /// Default channel order for raw frames
    pub pixel_format: PixelFormat,

    /// Encoding of streamed frames
    pub image_format: ImageFormat,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// PNG compression level (0-9)
    pub png_compression: u8,

    /// How long a streaming worker waits for a new frame before re-sending
    /// the current one
    pub frame_wait_timeout: Duration,

    /// Delay between heartbeat lines on the ping route
    pub ping_interval: Duration,

    /// Deadline for the TLS handshake plus request header block
    pub request_timeout: Duration,

    /// Largest accepted request header block
    pub max_request_size: usize,

    /// How long shutdown waits for workers to exit
    pub shutdown_grace: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Viewer page template file (built-in page when None)
    pub viewer_template: Option<PathBuf>,

    /// Frame served before the first publish
    pub placeholder_frame: Bytes,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Host::Localhost,
            port: DEFAULT_PORT,
            next_free_port: true,
            tls: None,
            secret: None,
            pixel_format: PixelFormat::Bgr,
            image_format: ImageFormat::Jpeg,
            jpeg_quality: 75,
            png_compression: 1,
            frame_wait_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_millis(250),
            request_timeout: Duration::from_secs(10),
            max_request_size: 64 * 1024, // 64KB
            shutdown_grace: Duration::from_secs(1),
            tcp_nodelay: true, // Frames should leave immediately
            viewer_template: None,
            placeholder_frame: Bytes::new(),
        }
    }
}

impl ServerConfig {
    /// Set the host
    pub fn host(mut self, host: impl Into<Host>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the requested port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable probing successive ports
    pub fn next_free_port(mut self, enabled: bool) -> Self {
        self.next_free_port = enabled;
        self
    }

    /// Serve over TLS
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the URL path secret
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the default raw pixel format
    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the streamed image format
    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    /// Set JPEG quality
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set PNG compression level
    pub fn png_compression(mut self, level: u8) -> Self {
        self.png_compression = level.min(9);
        self
    }

    /// Set the frame wait timeout
    pub fn frame_wait_timeout(mut self, timeout: Duration) -> Self {
        self.frame_wait_timeout = timeout;
        self
    }

    /// Set the heartbeat interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Load the viewer page from a file
    pub fn viewer_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.viewer_template = Some(path.into());
        self
    }

    /// Set the frame served before the first publish
    pub fn placeholder_frame(mut self, frame: impl Into<Bytes>) -> Self {
        self.placeholder_frame = frame.into();
        self
    }

    /// Encoder quality settings
    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            jpeg_quality: self.jpeg_quality,
            png_compression: self.png_compression,
        }
    }
}
