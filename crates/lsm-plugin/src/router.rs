//! Per-connection request router.
//!
//! One [`Router`] owns one connection for its whole life. It reads a request,
//! runs the bound handler, writes exactly one response and repeats until the
//! client disconnects, the stream breaks or `plugin_unregister` succeeds.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use lsm_protocol::{ErrorResponse, Request, Transport};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::config::PluginConfig;
use crate::error::PluginResult;
use crate::table::{DispatchTable, INFO_METHOD, TEARDOWN_METHOD};

/// What the loop does after a response has been written.
enum Flow {
    Continue,
    Teardown,
}

/// Serves requests from one client connection.
pub struct Router<S> {
    transport: Transport<S>,
    table: Arc<DispatchTable>,
    config: Arc<PluginConfig>,
}

impl<S> Router<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a router over an accepted stream.
    pub fn new(stream: S, table: Arc<DispatchTable>, config: Arc<PluginConfig>) -> Self {
        Self {
            transport: Transport::new(stream),
            table,
            config,
        }
    }

    /// Runs the request loop until the connection ends.
    ///
    /// Returns `Ok(())` on a clean close or after a successful
    /// `plugin_unregister`. Errors that leave the stream unusable end the
    /// loop and are returned; any other error is sent back to the client and
    /// the loop carries on.
    pub async fn run(mut self) -> PluginResult<()> {
        loop {
            let request = match self.transport.read_request().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("Client disconnected");
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "Error reading request");
                    return Err(e.into());
                }
                Err(e) => {
                    debug!(error = %e, "Rejected request");
                    self.transport.send_error(&e.to_response()).await?;
                    continue;
                }
            };

            let span = debug_span!(
                "dispatch",
                method = %request.method,
                elapsed_ms = tracing::field::Empty
            );
            let flow = self.dispatch(request).instrument(span).await?;

            if let Flow::Teardown = flow {
                if let Err(e) = self.transport.shutdown().await {
                    debug!(error = %e, "Error closing connection");
                }
                info!("Client unregistered, connection closed");
                return Ok(());
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> PluginResult<Flow> {
        let started = Instant::now();
        let method = request.method;

        if method == INFO_METHOD {
            let info = json!([self.config.description, self.config.version]);
            self.transport.send_response(&info).await?;
            return Ok(Flow::Continue);
        }

        let Some(handler) = self.table.get(&method) else {
            debug!("Method not supported");
            self.transport
                .send_error(&ErrorResponse::no_support(&method))
                .await?;
            return Ok(Flow::Continue);
        };

        let outcome = handler(Value::Object(request.params)).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::Span::current().record("elapsed_ms", elapsed_ms);

        match outcome {
            Ok(result) => {
                self.transport.send_response(&result).await?;
                if method == TEARDOWN_METHOD {
                    return Ok(Flow::Teardown);
                }
            }
            Err(e) => {
                debug!(code = %e.code, message = %e.message, "Handler failed");
                self.transport.send_error(&e).await?;
            }
        }
        Ok(Flow::Continue)
    }
}

/// Accepts connections until `shutdown` completes, running one [`Router`]
/// per connection.
///
/// Routers share the dispatch table and configuration and nothing else. A
/// failed accept is logged and the loop keeps going.
pub async fn serve<F>(
    listener: UnixListener,
    table: Arc<DispatchTable>,
    config: Arc<PluginConfig>,
    shutdown: F,
) -> PluginResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    debug!("Accepted new connection");
                    let router = Router::new(stream, Arc::clone(&table), Arc::clone(&config));
                    tokio::spawn(async move {
                        if let Err(e) = router.run().await {
                            warn!(error = %e, "Connection handler error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}
