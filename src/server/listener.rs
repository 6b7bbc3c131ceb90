//! Stream server listener
//!
//! Binds the socket, runs the accept loop and spawns one worker task per
//! connection. Shutdown is cooperative: cancelling the server token stops the
//! accept loop and every worker at its next await point.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::error::{EncodeError, Result};
use crate::frame::{FrameEncoder, FrameStore, PixelFormat, RawFrame};
use crate::server::address::{bind_listener, resolve_host, BoundAddress};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::{NoopHandler, StreamHandler};
use crate::server::{secret, SharedState};
use crate::session::ConnectionContext;
use crate::stats::ServerStats;
use crate::tls;

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// MJPEG stream server
pub struct StreamServer<H: StreamHandler = NoopHandler> {
    config: ServerConfig,
    secret: String,
    handler: Arc<H>,
    frames: Arc<FrameStore>,
    encoder: Option<Arc<dyn FrameEncoder>>,
}

impl StreamServer<NoopHandler> {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_handler(config, NoopHandler)
    }
}

impl<H: StreamHandler> StreamServer<H> {
    /// Create a new server with the given configuration and handler
    ///
    /// The secret is sanitized or generated here; the configuration does not
    /// change after this point.
    pub fn with_handler(config: ServerConfig, handler: H) -> Result<Self> {
        let secret = secret::resolve(config.secret.as_deref())?;
        let frames = Arc::new(FrameStore::with_placeholder(config.placeholder_frame.clone()));

        Ok(Self {
            config,
            secret,
            handler: Arc::new(handler),
            frames,
            encoder: None,
        })
    }

    /// Encode raw frames with `encoder`
    ///
    /// Without an explicit placeholder frame, a 1x1 black image from this
    /// encoder is served until the first publish.
    pub fn with_encoder(mut self, encoder: impl FrameEncoder) -> Self {
        if self.config.placeholder_frame.is_empty() {
            let black = [0u8; 3];
            let frame = RawFrame::new(1, 1, 3, PixelFormat::Rgb, &black);
            match encoder.encode(&frame, self.config.image_format, self.config.encode_settings()) {
                Ok(data) => self.frames.reset_placeholder(data),
                Err(e) => tracing::warn!(error = %e, "Failed to encode placeholder frame"),
            }
        }

        self.encoder = Some(Arc::new(encoder));
        self
    }

    /// The URL path secret
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Frame store that producers publish into
    ///
    /// Available before `start`, so a producer can be set up first.
    pub fn frames(&self) -> Arc<FrameStore> {
        Arc::clone(&self.frames)
    }

    /// Bind the listener and start accepting connections
    ///
    /// Returns once the socket is listening; the accept loop runs in the
    /// background until the returned handle is stopped or dropped.
    pub async fn start(self) -> Result<ServerHandle> {
        let host = resolve_host(&self.config.host).await?;

        let acceptor = match &self.config.tls {
            Some(tls_config) => {
                tls::ensure_cert_pair(tls_config, std::slice::from_ref(&host)).await?;
                Some(tls::build_acceptor(
                    &tls_config.cert_path,
                    &tls_config.key_path,
                )?)
            }
            None => None,
        };

        let listener = bind_listener(&host, self.config.port, self.config.next_free_port).await?;
        let local_addr = listener.local_addr()?;

        let address = BoundAddress {
            host,
            port: local_addr.port(),
            local_addr,
            secure: acceptor.is_some(),
        };
        let url = address.url(&self.secret);

        let shared = Arc::new(SharedState::with_frames(
            self.config,
            self.secret,
            url.clone(),
            self.frames,
        ));
        let cancel = CancellationToken::new();

        let accept_loop = AcceptLoop {
            listener,
            acceptor,
            shared: Arc::clone(&shared),
            handler: Arc::clone(&self.handler),
            cancel: cancel.clone(),
            workers: HashMap::new(),
            next_session_id: 1,
        };
        let accept_task = tokio::spawn(accept_loop.run());

        tracing::info!(addr = %local_addr, "Serving at {}?q=viewer", url);
        self.handler.on_started(&url).await;

        Ok(ServerHandle {
            address,
            shared,
            encoder: self.encoder,
            cancel,
            accept_task: Some(accept_task),
        })
    }

    /// Run the server until `shutdown` completes, then stop it
    pub async fn run_until<F>(self, shutdown: F) -> Result<ServerStats>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start().await?;

        shutdown.await;
        tracing::info!("Shutdown signal received");

        Ok(handle.stop().await)
    }
}

/// Handle to a running server
///
/// Stopping consumes the handle. Dropping it without `stop` still cancels the
/// server, but does not wait for the accept loop to finish.
pub struct ServerHandle {
    address: BoundAddress,
    shared: Arc<SharedState>,
    encoder: Option<Arc<dyn FrameEncoder>>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn address(&self) -> &BoundAddress {
        &self.address
    }

    /// Public stream URL
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// URL of the viewer page
    pub fn viewer_url(&self) -> String {
        format!("{}?q=viewer", self.shared.url)
    }

    /// URL of the heartbeat route
    pub fn ping_url(&self) -> String {
        format!("{}?q=ping", self.shared.url)
    }

    /// The URL path secret
    pub fn secret(&self) -> &str {
        &self.shared.secret
    }

    /// Frame store that producers publish into
    pub fn frames(&self) -> Arc<FrameStore> {
        Arc::clone(&self.shared.frames)
    }

    /// Publish a pre-encoded frame
    pub fn publish(&self, frame: impl Into<Bytes>) -> u64 {
        self.shared.frames.publish(frame)
    }

    /// Encode and publish a raw pixel buffer
    pub fn publish_raw(&self, frame: &RawFrame<'_>) -> Result<u64> {
        let encoder = self.encoder.as_ref().ok_or(EncodeError::NoEncoder)?;
        let config = &self.shared.config;

        let data = encoder.encode(frame, config.image_format, config.encode_settings())?;
        Ok(self.shared.frames.publish(data))
    }

    /// Encode and publish pixels in the configured pixel format
    pub fn publish_pixels(&self, width: u32, height: u32, channels: u8, data: &[u8]) -> Result<u64> {
        let frame = RawFrame::new(width, height, channels, self.shared.config.pixel_format, data);
        self.publish_raw(&frame)
    }

    /// Snapshot of the server counters
    pub fn stats(&self) -> ServerStats {
        self.shared
            .metrics
            .snapshot(self.shared.frames.version())
    }

    /// Number of open client connections
    pub fn active_connections(&self) -> u64 {
        self.shared.metrics.active_connections()
    }

    /// Whether the accept loop is still running
    pub fn is_running(&self) -> bool {
        self.accept_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the server
    ///
    /// Closes the listener and gives open connections up to the configured
    /// grace period to exit. Returns the final counters.
    pub async fn stop(mut self) -> ServerStats {
        self.cancel.cancel();

        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Accept loop panicked");
            }
        }

        tracing::info!("Server stopped");
        self.stats()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.accept_task.take().is_some() {
            tracing::debug!("Server handle dropped without stop, cancelling");
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("address", &self.address)
            .field("url", &self.shared.url)
            .finish()
    }
}

/// Accept loop state, owned by its task
struct AcceptLoop<H> {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    shared: Arc<SharedState>,
    handler: Arc<H>,
    cancel: CancellationToken,
    /// Worker registry, pruned of finished tasks on every accept
    workers: HashMap<u64, JoinHandle<()>>,
    next_session_id: u64,
}

impl<H: StreamHandler> AcceptLoop<H> {
    async fn run(mut self) {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        let AcceptLoop {
            listener,
            shared,
            workers,
            ..
        } = self;
        drop(listener);
        tracing::debug!("Listener closed");

        drain_workers(workers, shared.config.shutdown_grace).await;
    }

    fn handle_connection(&mut self, socket: TcpStream, peer_addr: SocketAddr) {
        self.workers.retain(|_, handle| !handle.is_finished());

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.shared.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(session_id = session_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        self.shared.metrics.connection_opened();

        let ctx = ConnectionContext::new(session_id, peer_addr, self.acceptor.is_some());
        let acceptor = self.acceptor.clone();
        let shared = Arc::clone(&self.shared);
        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.child_token();

        let handle = tokio::spawn(async move {
            if handler.on_connection(&ctx).await {
                serve_socket(
                    socket,
                    acceptor,
                    ctx.clone(),
                    Arc::clone(&shared),
                    Arc::clone(&handler),
                    cancel,
                )
                .await;
            } else {
                tracing::debug!(session_id = session_id, "Connection refused by handler");
            }

            handler.on_disconnect(&ctx).await;
            shared.metrics.connection_closed();

            tracing::debug!(session_id = session_id, "Connection closed");
        });

        self.workers.insert(session_id, handle);
    }
}

/// Run the worker over plain TCP, or over TLS once the handshake completes
async fn serve_socket<H: StreamHandler>(
    socket: TcpStream,
    acceptor: Option<TlsAcceptor>,
    ctx: ConnectionContext,
    shared: Arc<SharedState>,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    let Some(acceptor) = acceptor else {
        Connection::new(socket, ctx, shared, handler, cancel).run().await;
        return;
    };

    let deadline = shared.config.request_timeout;
    let handshake = tokio::select! {
        _ = cancel.cancelled() => return,
        handshake = tokio::time::timeout(deadline, acceptor.accept(socket)) => handshake,
    };

    match handshake {
        Ok(Ok(stream)) => {
            Connection::new(stream, ctx, shared, handler, cancel).run().await;
        }
        Ok(Err(e)) => {
            tracing::debug!(
                session_id = ctx.session_id,
                peer = %ctx.peer_addr,
                error = %e,
                "TLS handshake failed"
            );
        }
        Err(_) => {
            tracing::debug!(session_id = ctx.session_id, "TLS handshake timed out");
        }
    }
}

/// Wait up to `grace` for registered workers to exit
async fn drain_workers(workers: HashMap<u64, JoinHandle<()>>, grace: Duration) {
    let mut pending: Vec<JoinHandle<()>> = workers
        .into_values()
        .filter(|handle| !handle.is_finished())
        .collect();

    if pending.is_empty() {
        return;
    }

    tracing::debug!(workers = pending.len(), "Waiting for connections to close");

    let all = async {
        for handle in pending.iter_mut() {
            let _ = handle.await;
        }
    };

    if tokio::time::timeout(grace, all).await.is_err() {
        let remaining = pending.iter().filter(|h| !h.is_finished()).count();
        tracing::warn!(
            remaining = remaining,
            "Connections still open after shutdown grace period"
        );
    }
}
