//! Annunciator Core - Display Arbitration Domain Model
//!
//! Pure types and interfaces shared by every annunciator crate. Nothing in
//! here performs I/O; device and intercom access is expressed as effect
//! traits that the runtime wires to real or mock handlers.
//!
//! # Contents
//! - `DisplayCode` and the relational priority table (`has_priority`)
//! - Drum positions, cut-cycle stages and timers (`DrumState`)
//! - Alarm flags and the active-alarm text (`AlarmState`)
//! - Error taxonomy (`AnnunciatorError`)
//! - `SignEffects` / `IntercomEffects` collaborator interfaces
//! - Process-wide `ShutdownSignal` and the `RetryPolicy` combinator

#![forbid(unsafe_code)]

/// Alarm flags, deck codes and alert text formatting
pub mod alarm;

/// Display codes, priority rules and published snapshots
pub mod display;

/// Drum positions, stages and timers
pub mod drum;

/// Collaborator interfaces (sign device, intercom)
pub mod effects;

/// Unified error handling
pub mod errors;

/// Retry combinators tied to the shutdown signal
pub mod reliability;

/// Cooperative process-wide shutdown
pub mod shutdown;

pub use alarm::{AlarmState, Deck};
pub use display::{has_priority, DisplayCode, DisplaySnapshot};
pub use drum::{DrumPosition, DrumState, StageCode, Timer, TimerKind, DRUM_COUNT};
pub use errors::{AnnunciatorError, Result};
pub use reliability::RetryPolicy;
pub use shutdown::{ShutdownHandle, ShutdownSignal};
