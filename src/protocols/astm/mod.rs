//! ASTM E1381/E1394 receiver protocol.
//!
//! A passive responder for exercising instrument drivers:
//! - Client sends: `<ENQ>` to open a transfer
//! - Server responds: `<ACK>`
//! - Client sends: `<STX>` framed records (`H`, `P`, `O`, `R`, `C`, `L`)
//! - Server responds: `<ACK>` per chunk holding a frame
//! - Client sends: `<EOT>` to close the transfer, no reply
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  <ENQ>
//! Response: <ACK>
//!
//! Request:  <STX>H|\^&|||analyzer|||||P|1<CR><ETX>
//! Response: <ACK>
//!
//! Request:  <EOT>
//! Response: (nothing)
//! ```
//!
//! Checksums, frame numbers and ETX/ETB termination are not validated and
//! NAK is never sent. Each read is handled as one chunk; frames split across
//! reads or packed into one read are not reassembled.

pub mod handler;
pub mod parser;

pub use handler::{handle_connection, CloseReason};
