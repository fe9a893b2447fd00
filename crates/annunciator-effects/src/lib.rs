//! Annunciator Effects - Production Effect Handlers
//!
//! Implementations of the `annunciator-core` effect traits against real
//! hardware links.
//!
//! - [`SignDriver`]: maps display-level operations onto [`SignCommand`]s and
//!   delivers them through any [`SignLink`]
//! - [`BridgeLink`]: `SignLink` over TCP to the serial bridge in front of the
//!   sign, with bounded retries
//! - [`TcpIntercomHandler`]: speech announcements over TCP and panel light
//!   byte through a [`PanelBus`]
//!
//! Handlers are stateless apart from the device-facing state they must
//! mirror (the intercom light byte). Arbitration lives in `annunciator-agent`.

#![forbid(unsafe_code)]

pub mod intercom;
pub mod sign;

pub use intercom::{IntercomConfig, LoggingPanelBus, PanelBus, TcpIntercomHandler};
pub use sign::bridge::{BridgeConfig, BridgeLink};
pub use sign::command::{SignColor, SignCommand};
pub use sign::driver::{SignDriver, SignLink};
