//! Intercom panel effect interface.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::display::DisplayCode;
use crate::drum::{DrumPosition, StageCode, Timer};

/// Intercom hardware failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntercomError {
    #[error("panel bus write failed: {0}")]
    Bus(String),

    #[error("speech host unreachable: {0}")]
    Speech(String),
}

/// Announcements and panel signalling.
///
/// Announcements are fire-and-forget: implementations log their own
/// failures. `power_cycle` is the exception, callers wait for it and retry on
/// error.
#[async_trait]
pub trait IntercomEffects: Send + Sync {
    async fn announce_stage(&self, position: DrumPosition, stage: StageCode);

    async fn announce_timer(&self, position: DrumPosition, timer: &Timer, remaining: Duration);

    async fn announce_message(&self, display: DisplayCode, text: &str);

    /// Red while `stage` is cutting, green otherwise.
    async fn update_light(&self, position: DrumPosition, stage: StageCode);

    async fn play_alert(&self, message: &str);

    /// Cut and restore power to the sign. Resolves once the power line has
    /// been released again.
    async fn power_cycle(&self) -> Result<(), IntercomError>;
}
