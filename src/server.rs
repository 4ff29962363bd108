//! TCP listener for ASTM instrument connections.
//!
//! Accepts connections, runs one handler task per connection and owns the
//! start/stop lifecycle. Handlers only ever see their own stream and a stop
//! receiver.

use crate::config::Config;
use crate::protocols::astm::{handle_connection, CloseReason};
use crate::shutdown::cancelled;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore, TryAcquireError};
use tracing::{debug, error, info, warn};

/// How long `serve` waits for handlers to close after a stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listen backlog
const BACKLOG: i32 = 128;

/// Server instance
pub struct Server {
    config: Config,
    connection_limit: Arc<Semaphore>,
    permits: u32,
    shutdown: watch::Sender<bool>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let permits = u32::try_from(config.max_connections).unwrap_or(u32::MAX);
        let (shutdown, _) = watch::channel(false);

        Server {
            config,
            connection_limit: Arc::new(Semaphore::new(permits as usize)),
            permits,
            shutdown,
        }
    }

    /// Resolve the configured address and open the listening socket.
    ///
    /// Every resolved address is tried in turn; the last bind error is
    /// returned if none succeeds.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = self.config.listen_address();
        let candidates = tokio::net::lookup_host(&address)
            .await
            .map_err(|e| ServerError::Resolve(address.clone(), e))?;

        let mut last_error = None;
        for addr in candidates {
            match create_listener(addr) {
                Ok(std_listener) => {
                    let listener = TcpListener::from_std(std_listener)
                        .map_err(|e| ServerError::Bind(addr, e))?;
                    return Ok(listener);
                }
                Err(e) => {
                    debug!(address = %addr, error = %e, "Bind attempt failed");
                    last_error = Some(ServerError::Bind(addr, e));
                }
            }
        }

        Err(last_error.unwrap_or(ServerError::NoAddress(address)))
    }

    /// Bind and accept connections until `stop` is called.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections on an already bound listener until `stop` is called.
    pub async fn serve(&self, listener: TcpListener) {
        let mut shutdown = self.shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Ready to receive ASTM E1381/E1394 messages");
        }

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                _ = cancelled(&mut shutdown) => break,
            };

            // Accepting never waits on a slot; a full server closes the newcomer.
            let permit = match self.connection_limit.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    warn!(
                        peer = %peer,
                        max_connections = self.permits,
                        "Connection limit reached, closing new connection"
                    );
                    drop(stream);
                    continue;
                }
                Err(TryAcquireError::Closed) => break,
            };

            info!(peer = %peer, "Instrument connected");
            let stop = self.shutdown.subscribe();

            tokio::spawn(async move {
                match handle_connection(stream, peer, stop).await {
                    Ok(summary) => {
                        let how = match summary.reason {
                            CloseReason::PeerClosed => "peer closed",
                            CloseReason::Cancelled => "listener stopping",
                        };
                        info!(
                            peer = %peer,
                            chunks = summary.chunks,
                            frames = summary.frames,
                            acks_sent = summary.acks_sent,
                            "Instrument disconnected ({how})"
                        );
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "Connection error, closing");
                    }
                }
                drop(permit);
            });
        }

        drop(listener);
        info!("Listener closed");

        // Every permit back means every handler has released its stream.
        let drained = tokio::time::timeout(
            DRAIN_TIMEOUT,
            self.connection_limit.acquire_many(self.permits),
        )
        .await;
        if drained.is_err() {
            warn!("Connections still open after drain timeout");
        }
    }

    /// Ask the accept loop and every connection handler to finish.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Create the listening socket with SO_REUSEADDR so restarts can rebind
/// while old connections sit in TIME_WAIT.
fn create_listener(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}

/// Listener startup errors
#[derive(Debug)]
pub enum ServerError {
    Resolve(String, std::io::Error),
    NoAddress(String),
    Bind(SocketAddr, std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Resolve(address, e) => {
                write!(f, "Failed to resolve listen address '{}': {}", address, e)
            }
            ServerError::NoAddress(address) => {
                write!(f, "Listen address '{}' resolved to nothing", address)
            }
            ServerError::Bind(addr, e) => write!(f, "Failed to bind {}: {}", addr, e),
        }
    }
}

impl std::error::Error for ServerError {}
