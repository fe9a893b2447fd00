//! Intercom panel handler.
//!
//! Speech goes to the text-to-speech host as plain text over a fresh TCP
//! connection. Panel outputs are one byte: bits 0-5 are the drum lights
//! (1 = green, 0 = red) and bit 7 drives the sign power relay.

use std::sync::Arc;
use std::time::Duration;

use annunciator_core::effects::{IntercomEffects, IntercomError};
use annunciator_core::{DisplayCode, DrumPosition, ShutdownSignal, StageCode, Timer, TimerKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const POWER_CYCLE_BIT: u8 = 7;

/// Output side of the panel I/O expander.
pub trait PanelBus: Send + Sync {
    fn write_outputs(&self, byte: u8) -> Result<(), IntercomError>;
}

/// Panel bus for hosts without the expander; records the byte in the log.
#[derive(Debug, Default)]
pub struct LoggingPanelBus;

impl PanelBus for LoggingPanelBus {
    fn write_outputs(&self, byte: u8) -> Result<(), IntercomError> {
        debug!(outputs = format_args!("{byte:08b}"), "panel outputs");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IntercomConfig {
    /// `host:port` of the text-to-speech host
    pub speech_addr: String,
    pub io_timeout: Duration,
    /// How long the power relay is held open
    pub power_cycle_hold: Duration,
    /// Repeated writes of the relay byte, the expander occasionally drops one
    pub power_cycle_pulses: u32,
}

impl Default for IntercomConfig {
    fn default() -> Self {
        Self {
            speech_addr: "127.0.0.1:9200".to_string(),
            io_timeout: Duration::from_secs(5),
            power_cycle_hold: Duration::from_secs(5),
            power_cycle_pulses: 10,
        }
    }
}

pub struct TcpIntercomHandler {
    config: IntercomConfig,
    bus: Arc<dyn PanelBus>,
    outputs: Mutex<u8>,
    shutdown: ShutdownSignal,
}

impl TcpIntercomHandler {
    /// All drum lights start red until a stage is known.
    pub fn new(config: IntercomConfig, bus: Arc<dyn PanelBus>, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            bus,
            outputs: Mutex::new(0),
            shutdown,
        }
    }

    /// Current panel output byte.
    pub fn outputs(&self) -> u8 {
        *self.outputs.lock()
    }

    fn set_bit(&self, bit: u8, on: bool) -> Result<(), IntercomError> {
        let mut outputs = self.outputs.lock();
        if on {
            *outputs |= 1 << bit;
        } else {
            *outputs &= !(1 << bit);
        }
        self.bus.write_outputs(*outputs)
    }

    async fn speak(&self, text: &str) -> Result<(), IntercomError> {
        let speech = |e: String| IntercomError::Speech(e);
        let mut stream = timeout(
            self.config.io_timeout,
            TcpStream::connect(&self.config.speech_addr),
        )
        .await
        .map_err(|_| speech("connect timed out".into()))?
        .map_err(|e| speech(e.to_string()))?;

        timeout(self.config.io_timeout, stream.write_all(text.as_bytes()))
            .await
            .map_err(|_| speech("write timed out".into()))?
            .map_err(|e| speech(e.to_string()))?;
        stream.shutdown().await.map_err(|e| speech(e.to_string()))
    }

    async fn announce(&self, text: &str) {
        debug!(text, "sending announcement");
        if let Err(err) = self.speak(text).await {
            warn!(error = %err, "announcement not delivered");
        }
    }
}

/// Text for a message announcement; danger and warning get a spoken prefix.
pub fn message_announcement(display: DisplayCode, text: &str) -> String {
    match display {
        DisplayCode::MsgDanger => format!("Danger. {text}"),
        DisplayCode::MsgWarning => format!("Warning. {text}"),
        _ => text.to_string(),
    }
}

/// Text for a timer-start announcement, minutes rounded to the nearest.
pub fn timer_announcement(position: DrumPosition, timer: &Timer, remaining: Duration) -> String {
    let minutes = (remaining.as_secs() + 30) / 60;
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    let subject = match timer.kind {
        TimerKind::Iso => format!(
            "Isolation valve {} for drum {position} is allowed to close in approximately ",
            timer.details
        ),
        TimerKind::None => String::new(),
    };
    format!("{subject}{minutes} {unit}")
}

#[async_trait]
impl IntercomEffects for TcpIntercomHandler {
    async fn announce_stage(&self, position: DrumPosition, stage: StageCode) {
        self.announce(&format!("Drum {position} {}", stage.announcement()))
            .await;
    }

    async fn announce_timer(&self, position: DrumPosition, timer: &Timer, remaining: Duration) {
        self.announce(&timer_announcement(position, timer, remaining))
            .await;
    }

    async fn announce_message(&self, display: DisplayCode, text: &str) {
        self.announce(&message_announcement(display, text)).await;
    }

    async fn update_light(&self, position: DrumPosition, stage: StageCode) {
        let bit = position.index() as u8;
        if let Err(err) = self.set_bit(bit, !stage.is_cutting()) {
            warn!(drum = %position, error = %err, "drum light not updated");
        }
    }

    async fn play_alert(&self, message: &str) {
        self.announce(message).await;
    }

    async fn power_cycle(&self) -> Result<(), IntercomError> {
        info!(hold = ?self.config.power_cycle_hold, "opening sign power relay");
        for _ in 0..self.config.power_cycle_pulses.max(1) {
            self.set_bit(POWER_CYCLE_BIT, true)?;
        }
        // The relay is released even when shutdown cuts the hold short.
        let held = self.shutdown.sleep(self.config.power_cycle_hold).await;
        self.set_bit(POWER_CYCLE_BIT, false)?;
        if held {
            info!("sign power relay closed");
        } else {
            info!("sign power relay closed early for shutdown");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annunciator_core::ShutdownHandle;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct RecordingBus {
        writes: Mutex<Vec<u8>>,
    }

    impl PanelBus for RecordingBus {
        fn write_outputs(&self, byte: u8) -> Result<(), IntercomError> {
            self.writes.lock().push(byte);
            Ok(())
        }
    }

    fn handler() -> (TcpIntercomHandler, Arc<RecordingBus>) {
        let bus = Arc::new(RecordingBus::default());
        (
            TcpIntercomHandler::new(
                IntercomConfig::default(),
                bus.clone(),
                ShutdownSignal::never(),
            ),
            bus,
        )
    }

    #[tokio::test]
    async fn cutting_drum_turns_its_light_red() {
        let (intercom, _bus) = handler();
        intercom.update_light(DrumPosition::D1A, StageCode::Online).await;
        intercom.update_light(DrumPosition::D2A, StageCode::Vent).await;
        assert_eq!(intercom.outputs(), 0b0000_0101);

        intercom.update_light(DrumPosition::D1A, StageCode::Cut).await;
        assert_eq!(intercom.outputs(), 0b0000_0100);
    }

    #[tokio::test(start_paused = true)]
    async fn power_cycle_pulses_then_releases_relay() {
        let (intercom, bus) = handler();
        intercom.update_light(DrumPosition::D1B, StageCode::Drain).await;

        intercom.power_cycle().await.unwrap();

        let writes = bus.writes.lock().clone();
        assert_eq!(writes.len(), 1 + 10 + 1);
        assert_eq!(writes[1], 0b1000_0010);
        assert_eq!(*writes.last().unwrap(), 0b0000_0010);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_relay_hold_short() {
        let bus = Arc::new(RecordingBus::default());
        let shutdown = ShutdownHandle::new();
        let config = IntercomConfig {
            power_cycle_hold: Duration::from_secs(3600),
            ..IntercomConfig::default()
        };
        let intercom = Arc::new(TcpIntercomHandler::new(config, bus.clone(), shutdown.signal()));

        let cycling = {
            let intercom = intercom.clone();
            tokio::spawn(async move { intercom.power_cycle().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(intercom.outputs() & 0b1000_0000, 0b1000_0000);

        let started = tokio::time::Instant::now();
        shutdown.trigger();
        cycling.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(intercom.outputs() & 0b1000_0000, 0);
        assert_eq!(*bus.writes.lock().last().unwrap(), 0);
    }

    #[test]
    fn announcement_texts() {
        assert_eq!(
            message_announcement(DisplayCode::MsgDanger, "Leave deck"),
            "Danger. Leave deck"
        );
        assert_eq!(message_announcement(DisplayCode::Notify, "Hi"), "Hi");

        let timer = Timer {
            kind: TimerKind::Iso,
            start: NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(9, 0, 0)),
            duration_minutes: 10,
            details: "XV-12".into(),
        };
        assert_eq!(
            timer_announcement(DrumPosition::D3A, &timer, Duration::from_secs(89)),
            "Isolation valve XV-12 for drum 3A is allowed to close in approximately 1 minute"
        );
        assert!(
            timer_announcement(DrumPosition::D3A, &timer, Duration::from_secs(95))
                .ends_with("2 minutes")
        );
    }

    #[tokio::test]
    async fn unreachable_speech_host_is_only_logged() {
        let config = IntercomConfig {
            speech_addr: "127.0.0.1:1".into(),
            io_timeout: Duration::from_millis(200),
            ..IntercomConfig::default()
        };
        let intercom =
            TcpIntercomHandler::new(config, Arc::new(LoggingPanelBus), ShutdownSignal::never());
        intercom.play_alert("FIRE detected").await;
    }
}
