//! TCP listener that spawns one task per connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::handler::handle_connection;
use super::{ServerError, ServerState};

/// A server that accepts clients until its shutdown token is cancelled.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    /// Bind the server to `addr`.
    pub async fn bind(addr: impl ToSocketAddrs, state: ServerState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(state),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop and cancels every open stream.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown, then wait for open connections to
    /// finish.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = ?self.listener.local_addr().ok(), "Listening for connections");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
                    }
                    let span = info_span!("conn", id = %Uuid::new_v4(), peer = %peer);
                    self.tracker.spawn(
                        handle_connection(stream, self.state.clone(), self.shutdown.child_token())
                            .instrument(span),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                }
            }
        }

        self.tracker.close();
        info!(
            open = self.tracker.len(),
            "Shutting down, waiting for connections to close"
        );
        self.tracker.wait().await;
        Ok(())
    }
}
