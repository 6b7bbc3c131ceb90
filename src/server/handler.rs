//! Server event hooks
//!
//! Every method has a default, so implementors only override what they need.

use std::future::Future;

use crate::http::{RejectReason, Route};
use crate::session::ConnectionContext;

/// Callbacks invoked by the server and its connection workers
///
/// # Example
/// ```no_run
/// use streamserver::server::handler::StreamHandler;
/// use streamserver::session::ConnectionContext;
///
/// struct LocalOnly;
///
/// impl StreamHandler for LocalOnly {
///     async fn on_connection(&self, ctx: &ConnectionContext) -> bool {
///         ctx.peer_addr.ip().is_loopback()
///     }
/// }
/// ```
pub trait StreamHandler: Send + Sync + 'static {
    /// Called once the listener is up, with the public stream URL
    fn on_started(&self, url: &str) -> impl Future<Output = ()> + Send {
        let _ = url;
        async {}
    }

    /// Called for every accepted socket before anything is read
    ///
    /// Returning `false` closes the socket immediately.
    fn on_connection(&self, ctx: &ConnectionContext) -> impl Future<Output = bool> + Send {
        let _ = ctx;
        async { true }
    }

    /// Called when a request has been routed
    fn on_request(&self, ctx: &ConnectionContext, route: Route) -> impl Future<Output = ()> + Send {
        let _ = (ctx, route);
        async {}
    }

    /// Called when a request is dropped without a response
    fn on_rejected(
        &self,
        ctx: &ConnectionContext,
        reason: RejectReason,
    ) -> impl Future<Output = ()> + Send {
        let _ = (ctx, reason);
        async {}
    }

    /// Called after the connection is closed
    fn on_disconnect(&self, ctx: &ConnectionContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }
}

/// Handler that accepts everything and does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl StreamHandler for NoopHandler {}
