//! Host resolution and listener binding

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpListener, UdpSocket};

use crate::error::BindError;
use crate::server::config::Host;

/// Probe target for `Host::Global`; no packet is sent
const GLOBAL_PROBE_ADDR: &str = "1.1.1.1:80";

/// Address the listener actually ended up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAddress {
    /// Host as advertised in URLs
    pub host: String,
    /// Bound port (may be above the requested one)
    pub port: u16,
    /// Socket address reported by the OS
    pub local_addr: SocketAddr,
    /// Whether connections are TLS-wrapped
    pub secure: bool,
}

impl BoundAddress {
    /// `http` or `https`
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Public stream URL: `scheme://host:port/secret`
    pub fn url(&self, secret: &str) -> String {
        let host = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
            _ => self.host.clone(),
        };
        format!("{}://{}:{}/{}", self.scheme(), host, self.port, secret)
    }
}

/// Resolve the configured host to the name used for binding and URLs
pub async fn resolve_host(host: &Host) -> Result<String, BindError> {
    match host {
        Host::Localhost => Ok("localhost".to_string()),
        Host::Literal(host) => Ok(host.clone()),
        Host::Global => global_ip().await.map_err(|source| BindError::AddrResolution {
            host: "GLOBAL".to_string(),
            source,
        }),
    }
}

/// Local address of the route towards a public IP
async fn global_ip() -> io::Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(GLOBAL_PROBE_ADDR).await?;
    Ok(socket.local_addr()?.ip().to_string())
}

/// Bind a listener on `host`, starting at `port`
///
/// When the port is in use and `next_free_port` is set, successive ports are
/// tried up to 65535. Any other failure is returned immediately.
pub async fn bind_listener(
    host: &str,
    port: u16,
    next_free_port: bool,
) -> Result<TcpListener, BindError> {
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| BindError::AddrResolution {
            host: host.to_string(),
            source,
        })?
        .map(|addr| addr.ip())
        .collect();

    if addrs.is_empty() {
        return Err(BindError::AddrResolution {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        });
    }

    let mut current = port;
    loop {
        let candidates: Vec<SocketAddr> = addrs
            .iter()
            .map(|ip| SocketAddr::new(*ip, current))
            .collect();

        match TcpListener::bind(&candidates[..]).await {
            Ok(listener) => {
                if current != port {
                    tracing::info!(requested = port, bound = current, "Requested port busy, advanced");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && next_free_port => {
                if current == u16::MAX {
                    return Err(BindError::NoPortAvailable {
                        host: host.to_string(),
                        start_port: port,
                    });
                }
                tracing::debug!(port = current, "Port in use, trying next");
                current += 1;
            }
            Err(source) => {
                return Err(BindError::Io {
                    port: current,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(host: &str, secure: bool) -> BoundAddress {
        BoundAddress {
            host: host.to_string(),
            port: 5000,
            local_addr: "127.0.0.1:5000".parse().unwrap(),
            secure,
        }
    }

    #[test]
    fn test_url() {
        assert_eq!(bound("localhost", false).url("abc"), "http://localhost:5000/abc");
        assert_eq!(bound("10.0.0.2", true).url("abc"), "https://10.0.0.2:5000/abc");
        assert_eq!(bound("::1", false).url("abc"), "http://[::1]:5000/abc");
    }

    #[tokio::test]
    async fn test_resolve_host() {
        assert_eq!(resolve_host(&Host::Localhost).await.unwrap(), "localhost");
        assert_eq!(
            resolve_host(&Host::Literal("0.0.0.0".into())).await.unwrap(),
            "0.0.0.0"
        );
    }

    #[tokio::test]
    async fn test_bind_advances_past_busy_port() {
        let busy = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = busy.local_addr().unwrap().port();

        let listener = bind_listener("127.0.0.1", port, true).await.unwrap();
        assert!(listener.local_addr().unwrap().port() > port);
    }

    #[tokio::test]
    async fn test_bind_busy_port_without_advance() {
        let busy = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = busy.local_addr().unwrap().port();

        let result = bind_listener("127.0.0.1", port, false).await;
        assert!(matches!(result, Err(BindError::Io { port: p, .. }) if p == port));
    }

    #[tokio::test]
    async fn test_bind_last_port_busy() {
        let busy = match std::net::TcpListener::bind(("127.0.0.1", u16::MAX)) {
            Ok(listener) => listener,
            // Port taken by something else on this machine
            Err(_) => return,
        };

        let result = bind_listener("127.0.0.1", u16::MAX, true).await;
        assert!(matches!(result, Err(BindError::NoPortAvailable { .. })));
        drop(busy);
    }
}
