//! Error types
//!
//! Startup errors propagate to the caller of `StreamServer::start`. Errors on an
//! individual connection never leave its worker and are not represented here.

use std::io;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Raw I/O error
    Io(io::Error),
    /// Listener could not be bound
    Bind(BindError),
    /// TLS certificate provisioning or setup failed
    Tls(TlsError),
    /// Invalid configuration
    Config(ConfigError),
    /// Frame encoding failed
    Encode(EncodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Bind(e) => write!(f, "Bind error: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Encode(e) => write!(f, "Encode error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Bind(e) => Some(e),
            Error::Tls(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Encode(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<BindError> for Error {
    fn from(e: BindError) -> Self {
        Error::Bind(e)
    }
}

impl From<TlsError> for Error {
    fn from(e: TlsError) -> Self {
        Error::Tls(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        Error::Encode(e)
    }
}

/// Failure to bring up the listening socket
#[derive(Debug)]
pub enum BindError {
    /// Every port from the requested one up to 65535 was in use
    NoPortAvailable { host: String, start_port: u16 },
    /// Host could not be resolved to a local address
    AddrResolution { host: String, source: io::Error },
    /// Bind failed for a reason other than "address in use"
    Io { port: u16, source: io::Error },
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::NoPortAvailable { host, start_port } => {
                write!(f, "No port available on {} at or above {}", host, start_port)
            }
            BindError::AddrResolution { host, source } => {
                write!(f, "Failed to resolve host {}: {}", host, source)
            }
            BindError::Io { port, source } => {
                write!(f, "Failed to bind port {}: {}", port, source)
            }
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindError::NoPortAvailable { .. } => None,
            BindError::AddrResolution { source, .. } | BindError::Io { source, .. } => {
                Some(source)
            }
        }
    }
}

/// TLS setup failure
#[derive(Debug)]
pub enum TlsError {
    /// Certificate pair could not be generated
    Provision(String),
    /// Certificate or key file could not be read or written
    Io(io::Error),
    /// rustls rejected the certificate/key
    Rustls(rustls::Error),
    /// Certificate file contained no certificates
    NoCertificates,
    /// Key file contained no private key
    NoPrivateKey,
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Provision(msg) => write!(f, "Could not create TLS certificate: {}", msg),
            TlsError::Io(e) => write!(f, "Certificate I/O error: {}", e),
            TlsError::Rustls(e) => write!(f, "{}", e),
            TlsError::NoCertificates => write!(f, "No certificates found in certificate file"),
            TlsError::NoPrivateKey => write!(f, "No private key found in key file"),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<io::Error> for TlsError {
    fn from(e: io::Error) -> Self {
        TlsError::Io(e)
    }
}

impl From<rustls::Error> for TlsError {
    fn from(e: rustls::Error) -> Self {
        TlsError::Rustls(e)
    }
}

impl From<rcgen::Error> for TlsError {
    fn from(e: rcgen::Error) -> Self {
        TlsError::Provision(e.to_string())
    }
}

/// Invalid server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Supplied secret has no allowed characters left after sanitizing
    EmptySecret,
    /// System random source failed while generating a secret
    SecretGeneration,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptySecret => {
                write!(f, "Secret must contain at least one of [A-Za-z0-9,._-]")
            }
            ConfigError::SecretGeneration => write!(f, "Failed to generate a random secret"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Frame encoding failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// No encoder was configured on the server
    NoEncoder,
    /// Buffer length does not match width * height * channels
    BufferSize { expected: usize, actual: usize },
    /// Channel count the encoder cannot handle
    UnsupportedChannels(u8),
    /// Encoder backend failure
    Backend(String),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::NoEncoder => write!(f, "No frame encoder configured"),
            EncodeError::BufferSize { expected, actual } => {
                write!(f, "Frame buffer is {} bytes, expected {}", actual, expected)
            }
            EncodeError::UnsupportedChannels(n) => write!(f, "Unsupported channel count: {}", n),
            EncodeError::Backend(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EncodeError {}
