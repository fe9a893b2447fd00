//! Annunciator wire protocols.
//!
//! - [`framing`]: 4-byte big-endian length prefix over any async stream
//! - [`upstream`]: messages exchanged with the process-data source, and their
//!   validation into core types
//! - [`client`]: the two-byte command header protocol spoken by display clients

#![forbid(unsafe_code)]

pub mod client;
pub mod framing;
pub mod upstream;

pub use client::{
    drum_summary, query_replies, ClientKind, Command, CommandHeader, CustomMessage, ProtocolError,
    Reply,
};
pub use framing::{FrameError, FramedStream};
pub use upstream::{ClientMsg, MsgType, NotifyMsg, UpstreamResponse};
