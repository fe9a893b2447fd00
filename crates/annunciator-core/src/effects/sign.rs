//! LED sign effect interface.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::alarm::Deck;
use crate::display::DisplayCode;
use crate::drum::{DrumPosition, StageCode, Timer};

/// The sign did not confirm a command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No affirmative reply within the bounded retries
    #[error("sign did not acknowledge {command} after {attempts} attempts")]
    Unresponsive { command: String, attempts: u32 },

    /// Link to the sign could not be used at all
    #[error("sign link failed: {0}")]
    Link(String),
}

/// Display-level operations on the shared sign.
///
/// Callers must hold the sign lease for the whole call. Every method either
/// completes on the device or fails with a hard [`DeviceError`].
#[async_trait]
pub trait SignEffects: Send + Sync {
    /// Show `display`. `message` is the custom/notify text, or the active
    /// alarm list for `Alert`. When `restart_script` is false only the
    /// display's variable content is rewritten.
    async fn show(
        &self,
        display: DisplayCode,
        message: &str,
        deck: Deck,
        restart_script: bool,
    ) -> Result<(), DeviceError>;

    /// Replace a drum's image with its stage.
    async fn set_stage(&self, position: DrumPosition, stage: StageCode) -> Result<(), DeviceError>;

    /// Replace a drum's image with a countdown of `remaining`.
    async fn set_timer(
        &self,
        position: DrumPosition,
        timer: &Timer,
        remaining: Duration,
    ) -> Result<(), DeviceError>;

    /// Stop whatever script is playing.
    async fn reset(&self) -> Result<(), DeviceError>;
}
