//! Protocol implementations.
//!
//! - `astm`: ASTM E1381 link handshake with E1394 record classification

pub mod astm;
