//! TLS support
//!
//! Certificates are never interpreted here beyond loading them into rustls.
//! The provisioner only makes sure a PEM pair exists on disk; the acceptor
//! wraps accepted TCP streams so workers see the same read/write contract
//! either way.

pub mod acceptor;
pub mod provisioner;

pub use acceptor::build_acceptor;
pub use provisioner::{ensure_cert_pair, Provisioner, TlsConfig};
