//! Display-level sign handler.

use std::time::Duration;

use annunciator_core::effects::{DeviceError, SignEffects};
use annunciator_core::{Deck, DisplayCode, DrumPosition, StageCode, Timer, TimerKind};
use async_trait::async_trait;
use tracing::debug;

use super::command::{SignColor, SignCommand};

/// Device-facing contract: a command either reaches the sign and is
/// acknowledged within bounded retries, or fails as a [`DeviceError`].
#[async_trait]
pub trait SignLink: Send + Sync {
    async fn send(&self, command: &SignCommand) -> Result<(), DeviceError>;
}

/// [`SignEffects`] handler built on any [`SignLink`].
///
/// Each display has a script of the same name on the sign, and message
/// displays embed a variable file of that name too. `Error` reuses the
/// notify script, and `Alert` has separate `alarm` and `deck` variables.
#[derive(Debug)]
pub struct SignDriver<L> {
    link: L,
}

impl<L: SignLink> SignDriver<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn script_for(display: DisplayCode) -> &'static str {
        match display {
            DisplayCode::Error => DisplayCode::Notify.name(),
            other => other.name(),
        }
    }

    fn drum_variable(position: DrumPosition) -> String {
        format!("drum{}", position.label().to_ascii_lowercase())
    }

    fn stage_color(stage: StageCode) -> SignColor {
        match stage {
            StageCode::Cut => SignColor::Red,
            StageCode::Online => SignColor::Green,
            StageCode::Unset => SignColor::White,
            _ => SignColor::Amber,
        }
    }
}

#[async_trait]
impl<L: SignLink> SignEffects for SignDriver<L> {
    async fn show(
        &self,
        display: DisplayCode,
        message: &str,
        deck: Deck,
        restart_script: bool,
    ) -> Result<(), DeviceError> {
        let script = Self::script_for(display);

        match display {
            DisplayCode::Drums => {}
            DisplayCode::Alert => {
                self.link
                    .send(&SignCommand::WriteText {
                        variable: "alarm".into(),
                        lines: vec![message.to_string()],
                        color: Some(SignColor::White),
                    })
                    .await?;
                self.link
                    .send(&SignCommand::WriteText {
                        variable: "deck".into(),
                        lines: vec![deck.label().to_string()],
                        color: None,
                    })
                    .await?;
            }
            _ => {
                self.link
                    .send(&SignCommand::WriteText {
                        variable: script.to_string(),
                        lines: message.split('\n').map(str::to_string).collect(),
                        color: None,
                    })
                    .await?;
            }
        }

        if restart_script {
            self.link.send(&SignCommand::Reset).await?;
            self.link
                .send(&SignCommand::PlayScript {
                    script: script.to_string(),
                })
                .await?;
        }
        Ok(())
    }

    async fn set_stage(&self, position: DrumPosition, stage: StageCode) -> Result<(), DeviceError> {
        self.link
            .send(&SignCommand::WriteStage {
                variable: Self::drum_variable(position),
                label: stage.label().to_string(),
                color: Self::stage_color(stage),
            })
            .await
    }

    async fn set_timer(
        &self,
        position: DrumPosition,
        timer: &Timer,
        remaining: Duration,
    ) -> Result<(), DeviceError> {
        match timer.kind {
            TimerKind::Iso => {
                self.link
                    .send(&SignCommand::WriteCountdown {
                        variable: Self::drum_variable(position),
                        caption: format!("close\n{}", timer.details),
                        seconds: remaining.as_secs(),
                    })
                    .await
            }
            TimerKind::None => {
                debug!(drum = %position, "no timer to draw");
                Ok(())
            }
        }
    }

    async fn reset(&self) -> Result<(), DeviceError> {
        self.link.send(&SignCommand::Reset).await
    }
}
