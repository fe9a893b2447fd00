//! Annunciator Testing Infrastructure
//!
//! Recording mocks for the sign and intercom effect traits, and a scripted
//! upstream source speaking the framed protocol over loopback TCP.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```rust,no_run
//! use annunciator_testkit::{MockIntercom, MockSign};
//!
//! let sign = MockSign::new();
//! let intercom = MockIntercom::new();
//! intercom.heal_on_power_cycle(&sign);
//! sign.set_unresponsive(true);
//! // hand `Arc::new(sign.clone())` to the code under test, then inspect
//! // `sign.calls()` and `intercom.calls()`
//! ```

pub mod mock_effects;
pub mod upstream;

pub use mock_effects::{IntercomCall, MockIntercom, MockSign, SignCall};
pub use upstream::{quiet_response, FakeUpstream};
