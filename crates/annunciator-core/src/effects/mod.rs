//! Collaborator interfaces (pure signatures, no implementations).
//!
//! - `SignEffects`: display-level operations on the LED sign
//! - `IntercomEffects`: announcements, panel lights and hardware power cycle
//!
//! Production handlers live in `annunciator-effects`; recording mocks live in
//! `annunciator-testkit`.

pub mod intercom;
pub mod sign;

pub use intercom::{IntercomEffects, IntercomError};
pub use sign::{DeviceError, SignEffects};
