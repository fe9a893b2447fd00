//! Annunciator Agent - Display Arbitration Runtime
//!
//! Everything that decides what the shared sign shows, and when.
//!
//! Producers:
//! - [`UpstreamPoller`]: alarms, drum stages and notifications from the
//!   process-data source
//! - [`ClientProtocolServer`]: custom messages, display-default and queries
//!   from display clients
//! - [`RevertScheduler`] tasks: timed return from custom messages
//!
//! All of them go through the [`DisplayArbiter`], which applies the
//! priority table and serialises device access through the [`SignLease`].
//! The [`PowerCycleCoordinator`] takes over when the sign stops answering.
//! [`Annunciator`] wires the pieces together.

#![forbid(unsafe_code)]

pub mod arbiter;
pub mod config;
pub mod lease;
pub mod poller;
pub mod recovery;
pub mod revert;
pub mod runtime;
pub mod server;
pub mod state;
pub mod tasks;

pub use arbiter::{ArbiterSettings, DefaultOutcome, DisplayArbiter};
pub use config::{AnnunciatorConfig, ConfigError};
pub use lease::{LeaseConfig, LeaseGuard, SignLease};
pub use poller::{PollError, PollOutcome, UpstreamPoller};
pub use recovery::PowerCycleCoordinator;
pub use revert::{RevertOutcome, RevertScheduler, RevertTarget, WaitToken};
pub use runtime::Annunciator;
pub use server::{ClientProtocolServer, CustomMessageSlot, SlotClaim};
pub use state::DisplayState;
pub use tasks::TaskRegistry;
