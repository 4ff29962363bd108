//! ASTM connection handler.
//!
//! Reads one chunk at a time, answers frames and enquiries with a single ACK
//! and logs every chunk. Nothing is validated and NAK is never sent.

use super::parser::{
    classify, control_signals, display_form, hex_form, ControlSignal, Reply, ACK,
};
use crate::shutdown::cancelled;
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info};

/// Read size for one chunk.
pub const CHUNK_SIZE: usize = 1024;

/// How a connection loop finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its write half.
    PeerClosed,
    /// The listener is shutting down.
    Cancelled,
}

/// Transfer phase as observed from the link control bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Transfer,
}

/// Per-connection counters reported when the connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub chunks: u64,
    pub frames: u64,
    pub acks_sent: u64,
    pub reason: CloseReason,
}

/// State for one accepted connection.
struct AstmHandler {
    peer: SocketAddr,
    phase: Phase,
    chunks: u64,
    frames: u64,
    acks_sent: u64,
}

impl AstmHandler {
    fn new(peer: SocketAddr) -> Self {
        AstmHandler {
            peer,
            phase: Phase::Idle,
            chunks: 0,
            frames: 0,
            acks_sent: 0,
        }
    }

    /// Count and log a chunk whose reply has already been sent.
    fn record(&mut self, chunk: &[u8], reply: Reply) {
        self.chunks += 1;
        let signals = control_signals(chunk);

        if reply == Reply::Frame {
            self.frames += 1;
            let record = classify(chunk);
            info!(
                peer = %self.peer,
                len = chunk.len(),
                hex = %hex_form(chunk),
                display = %display_form(chunk),
                record = %record,
                "ASTM frame received ({})",
                record.description()
            );
        } else if signals.contains(&ControlSignal::Eot) {
            info!(
                peer = %self.peer,
                len = chunk.len(),
                hex = %hex_form(chunk),
                display = %display_form(chunk),
                "End of transmission received, communication complete"
            );
        } else {
            info!(
                peer = %self.peer,
                len = chunk.len(),
                hex = %hex_form(chunk),
                display = %display_form(chunk),
                signals = ?signals,
                "Chunk received"
            );
        }

        self.track_phase(&signals);
    }

    fn track_phase(&mut self, signals: &[ControlSignal]) {
        for signal in signals {
            match (signal, self.phase) {
                (ControlSignal::Enq, Phase::Idle) => {
                    self.phase = Phase::Transfer;
                    debug!(peer = %self.peer, "Transfer opened by ENQ");
                }
                (ControlSignal::Eot, Phase::Transfer) => {
                    self.phase = Phase::Idle;
                    debug!(peer = %self.peer, "Transfer closed by EOT");
                }
                (ControlSignal::Eot, Phase::Idle) => {
                    debug!(peer = %self.peer, "EOT outside a transfer");
                }
                _ => {}
            }
        }
    }

    fn summary(&self, reason: CloseReason) -> ConnectionSummary {
        ConnectionSummary {
            chunks: self.chunks,
            frames: self.frames,
            acks_sent: self.acks_sent,
            reason,
        }
    }
}

/// Handle an ASTM connection until the peer closes, an I/O error occurs or
/// shutdown is signalled.
///
/// The stream is owned here and dropped on every exit path.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<ConnectionSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handler = AstmHandler::new(peer);
    let mut buffer = BytesMut::with_capacity(CHUNK_SIZE);

    loop {
        buffer.clear();

        let n = tokio::select! {
            read = stream.read_buf(&mut buffer) => read?,
            _ = cancelled(&mut shutdown) => {
                debug!(peer = %peer, "Shutdown requested, closing connection");
                return Ok(handler.summary(CloseReason::Cancelled));
            }
        };

        if n == 0 {
            return Ok(handler.summary(CloseReason::PeerClosed));
        }

        let chunk = &buffer[..n];
        let reply = Reply::for_chunk(chunk);
        if reply.acknowledges() {
            stream.write_all(&[ACK]).await?;
            stream.flush().await?;
            handler.acks_sent += 1;
            debug!(peer = %peer, reason = ?reply, "Sent ACK");
        }
        handler.record(chunk, reply);
    }
}
