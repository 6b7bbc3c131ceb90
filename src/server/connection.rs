//! Connection worker
//!
//! One task per accepted socket. Reads the header block, routes it, runs the
//! selected response protocol and closes. Every blocking point is raced against
//! the server's cancellation token, and no error ever leaves the worker.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::http::{
    find_header_end, frame_boundary, parse_request, viewer, RejectReason, Route, PING_HEADER,
    PONG, STREAM_HEADER, VIEWER_HEADER,
};
use crate::server::handler::StreamHandler;
use crate::server::SharedState;
use crate::session::{ConnectionContext, ConnectionState};

/// Read chunk size for the request header block
const READ_CHUNK: usize = 1024;

/// Upper bound on the graceful shutdown of a closing socket
const CLOSE_TIMEOUT: Duration = Duration::from_millis(250);

/// A single client connection
pub(crate) struct Connection<S, H> {
    stream: S,
    state: ConnectionState,
    ctx: ConnectionContext,
    shared: Arc<SharedState>,
    handler: Arc<H>,
    cancel: CancellationToken,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: StreamHandler,
{
    pub(crate) fn new(
        stream: S,
        ctx: ConnectionContext,
        shared: Arc<SharedState>,
        handler: Arc<H>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            state: ConnectionState::new(ctx.session_id, ctx.peer_addr),
            ctx,
            shared,
            handler,
            cancel,
        }
    }

    /// Run the connection to completion
    pub(crate) async fn run(mut self) {
        match self.read_request().await {
            Ok(route) => {
                self.state.on_route(route);
                self.shared.metrics.request_routed(route);
                self.handler.on_request(&self.ctx, route).await;

                tracing::debug!(
                    session_id = self.ctx.session_id,
                    route = %route,
                    "Request routed"
                );

                match route {
                    Route::Stream => self.serve_stream().await,
                    Route::Ping => self.serve_ping().await,
                    Route::Viewer => self.serve_viewer().await,
                }
            }
            Err(reason) => {
                self.shared.metrics.request_rejected();
                self.handler.on_rejected(&self.ctx, reason).await;

                tracing::debug!(
                    session_id = self.ctx.session_id,
                    peer = %self.ctx.peer_addr,
                    reason = %reason,
                    "Request rejected"
                );
            }
        }

        self.close().await;
    }

    /// Read the header block and classify it
    async fn read_request(&mut self) -> Result<Route, RejectReason> {
        let deadline = self.shared.config.request_timeout;

        let raw = match tokio::time::timeout(deadline, self.read_header_block()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::debug!(session_id = self.ctx.session_id, "Request timed out");
                return Err(RejectReason::Incomplete);
            }
        };

        self.state.request_complete();
        parse_request(&raw, &self.shared.secret)
    }

    async fn read_header_block(&mut self) -> Result<BytesMut, RejectReason> {
        let max = self.shared.config.max_request_size;
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut scanned = 0;

        loop {
            // Only rescan the tail that could hold a new terminator
            if find_header_end(&buf[scanned..]).is_some() {
                return Ok(buf);
            }
            scanned = buf.len().saturating_sub(3);

            if buf.len() > max {
                return Err(RejectReason::TooLarge);
            }

            buf.reserve(READ_CHUNK);
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Err(RejectReason::Incomplete),
                read = self.stream.read_buf(&mut buf) => read,
            };

            match read {
                Ok(0) => return Err(RejectReason::Incomplete),
                Ok(n) => self.state.bytes_received += n as u64,
                Err(e) => {
                    tracing::debug!(
                        session_id = self.ctx.session_id,
                        error = %e,
                        "Read failed"
                    );
                    return Err(RejectReason::Incomplete);
                }
            }
        }
    }

    /// multipart/x-mixed-replace stream of the current frame
    async fn serve_stream(&mut self) {
        if !self.send(STREAM_HEADER).await {
            return;
        }

        let boundary = frame_boundary(self.shared.config.image_format);
        if !self.send(&boundary).await {
            return;
        }

        let frames = Arc::clone(&self.shared.frames);
        let wait = self.shared.config.frame_wait_timeout;

        // New clients get the current picture right away, unless there is
        // nothing to show yet
        let mut updated = true;
        loop {
            let frame = frames.current();
            if !frame.data.is_empty() {
                if !self.send(&frame.data).await || !self.send(&boundary).await {
                    break;
                }
                self.state.frames_sent += 1;
                self.shared.metrics.frame_sent();

                tracing::trace!(
                    session_id = self.ctx.session_id,
                    version = frame.version,
                    updated = updated,
                    "Frame sent"
                );
            }

            // A publish during the write above returns at once; a timeout
            // re-sends the same frame as a keep-alive
            updated = tokio::select! {
                _ = self.cancel.cancelled() => break,
                updated = frames.wait_for_newer(frame.version, wait) => updated,
            };
        }
    }

    /// Heartbeat lines until the client leaves
    async fn serve_ping(&mut self) {
        if !self.send(PING_HEADER).await {
            return;
        }

        let interval = self.shared.config.ping_interval;
        while self.send(PONG).await {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One-shot viewer page
    async fn serve_viewer(&mut self) {
        if !self.send(VIEWER_HEADER).await {
            return;
        }

        let template = match viewer::load_template(self.shared.config.viewer_template.as_deref())
            .await
        {
            Ok(template) => template,
            Err(e) => {
                tracing::warn!(
                    session_id = self.ctx.session_id,
                    error = %e,
                    "Failed to load viewer template"
                );
                return;
            }
        };

        let html = viewer::render_viewer(&template, &self.shared.url);
        self.send(html.as_bytes()).await;
    }

    /// Write all of `data`
    ///
    /// Returns `false` if the write failed, wrote zero bytes, or the server is
    /// shutting down. Errors are logged, never propagated.
    async fn send(&mut self, data: &[u8]) -> bool {
        let stream = &mut self.stream;
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return false,
            result = async {
                stream.write_all(data).await?;
                stream.flush().await
            } => result,
        };

        match result {
            Ok(()) => {
                self.state.bytes_sent += data.len() as u64;
                self.shared.metrics.add_bytes_sent(data.len() as u64);
                true
            }
            Err(e) => {
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    error = %e,
                    "Write failed"
                );
                false
            }
        }
    }

    async fn close(&mut self) {
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.stream.shutdown()).await;
        let phase = self.state.close();

        tracing::debug!(
            session_id = self.ctx.session_id,
            phase = ?phase,
            route = ?self.state.route,
            bytes_sent = self.state.bytes_sent,
            frames_sent = self.state.frames_sent,
            duration_ms = self.state.duration().as_millis() as u64,
            "Connection finished"
        );
    }
}
