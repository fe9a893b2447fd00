//! Recording mocks for the sign and intercom.
//!
//! Both mocks are cheap clones over shared state: hand one clone to the
//! code under test and keep another to inspect calls and inject failures.

use std::sync::Arc;
use std::time::Duration;

use annunciator_core::effects::{DeviceError, IntercomEffects, IntercomError, SignEffects};
use annunciator_core::{Deck, DisplayCode, DrumPosition, StageCode, Timer, TimerKind};
use async_trait::async_trait;
use parking_lot::Mutex;

/// One call received by [`MockSign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignCall {
    Show {
        display: DisplayCode,
        message: String,
        deck: Deck,
        restart_script: bool,
    },
    Stage {
        position: DrumPosition,
        stage: StageCode,
    },
    Timer {
        position: DrumPosition,
        kind: TimerKind,
        remaining: Duration,
    },
    Reset,
}

#[derive(Debug, Default)]
struct SignState {
    calls: Vec<SignCall>,
    unresponsive: bool,
    fail_next: u32,
    latency: Option<Duration>,
}

/// [`SignEffects`] recorder with failure injection.
#[derive(Debug, Clone, Default)]
pub struct MockSign {
    state: Arc<Mutex<SignState>>,
}

impl MockSign {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a [`DeviceError`] until cleared.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.state.lock().unresponsive = unresponsive;
    }

    pub fn is_unresponsive(&self) -> bool {
        self.state.lock().unresponsive
    }

    /// The next `count` calls fail, later ones succeed.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().fail_next = count;
    }

    /// Simulated round-trip time applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    /// Successful calls, oldest first.
    pub fn calls(&self) -> Vec<SignCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    /// Displays shown with a script restart, in order.
    pub fn script_starts(&self) -> Vec<DisplayCode> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SignCall::Show {
                    display,
                    restart_script: true,
                    ..
                } => Some(display),
                _ => None,
            })
            .collect()
    }

    /// Every `show` call, in order.
    pub fn shows(&self) -> Vec<(DisplayCode, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SignCall::Show {
                    display, message, ..
                } => Some((display, message)),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, command: &str, call: SignCall) -> Result<(), DeviceError> {
        let latency = self.state.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if state.fail_next > 0 || state.unresponsive {
            state.fail_next = state.fail_next.saturating_sub(1);
            return Err(DeviceError::Unresponsive {
                command: command.to_string(),
                attempts: 1,
            });
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl SignEffects for MockSign {
    async fn show(
        &self,
        display: DisplayCode,
        message: &str,
        deck: Deck,
        restart_script: bool,
    ) -> Result<(), DeviceError> {
        self.record(
            "show",
            SignCall::Show {
                display,
                message: message.to_string(),
                deck,
                restart_script,
            },
        )
        .await
    }

    async fn set_stage(&self, position: DrumPosition, stage: StageCode) -> Result<(), DeviceError> {
        self.record("set_stage", SignCall::Stage { position, stage })
            .await
    }

    async fn set_timer(
        &self,
        position: DrumPosition,
        timer: &Timer,
        remaining: Duration,
    ) -> Result<(), DeviceError> {
        self.record(
            "set_timer",
            SignCall::Timer {
                position,
                kind: timer.kind,
                remaining,
            },
        )
        .await
    }

    async fn reset(&self) -> Result<(), DeviceError> {
        self.record("reset", SignCall::Reset).await
    }
}

/// One call received by [`MockIntercom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntercomCall {
    Stage(DrumPosition, StageCode),
    Timer(DrumPosition, TimerKind),
    Message(DisplayCode, String),
    Light(DrumPosition, StageCode),
    Alert(String),
    PowerCycle,
}

#[derive(Debug, Default)]
struct IntercomState {
    calls: Vec<IntercomCall>,
    failing_power_cycles: u32,
    heals: Option<MockSign>,
}

/// [`IntercomEffects`] recorder.
#[derive(Debug, Clone, Default)]
pub struct MockIntercom {
    state: Arc<Mutex<IntercomState>>,
}

impl MockIntercom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<IntercomCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    /// The next `count` power cycles fail.
    pub fn fail_power_cycles(&self, count: u32) {
        self.state.lock().failing_power_cycles = count;
    }

    /// A successful power cycle makes `sign` responsive again.
    pub fn heal_on_power_cycle(&self, sign: &MockSign) {
        self.state.lock().heals = Some(sign.clone());
    }

    pub fn power_cycles(&self) -> usize {
        self.count(|call| matches!(call, IntercomCall::PowerCycle))
    }

    pub fn alerts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                IntercomCall::Alert(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&IntercomCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: IntercomCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl IntercomEffects for MockIntercom {
    async fn announce_stage(&self, position: DrumPosition, stage: StageCode) {
        self.record(IntercomCall::Stage(position, stage));
    }

    async fn announce_timer(&self, position: DrumPosition, timer: &Timer, _remaining: Duration) {
        self.record(IntercomCall::Timer(position, timer.kind));
    }

    async fn announce_message(&self, display: DisplayCode, text: &str) {
        self.record(IntercomCall::Message(display, text.to_string()));
    }

    async fn update_light(&self, position: DrumPosition, stage: StageCode) {
        self.record(IntercomCall::Light(position, stage));
    }

    async fn play_alert(&self, message: &str) {
        self.record(IntercomCall::Alert(message.to_string()));
    }

    async fn power_cycle(&self) -> Result<(), IntercomError> {
        let heals = {
            let mut state = self.state.lock();
            if state.failing_power_cycles > 0 {
                state.failing_power_cycles -= 1;
                return Err(IntercomError::Bus("relay write failed".into()));
            }
            state.calls.push(IntercomCall::PowerCycle);
            state.heals.clone()
        };
        if let Some(sign) = heals {
            sign.set_unresponsive(false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fail_next_recovers_after_count() {
        let sign = MockSign::new();
        sign.fail_next(2);

        assert!(sign.reset().await.is_err());
        assert!(sign.reset().await.is_err());
        assert!(sign.reset().await.is_ok());
        assert_eq!(sign.calls(), vec![SignCall::Reset]);
    }

    #[tokio::test]
    async fn power_cycle_heals_linked_sign() {
        let sign = MockSign::new();
        let intercom = MockIntercom::new();
        intercom.heal_on_power_cycle(&sign);
        intercom.fail_power_cycles(1);
        sign.set_unresponsive(true);

        assert!(intercom.power_cycle().await.is_err());
        assert!(sign.is_unresponsive());

        intercom.power_cycle().await.unwrap();
        assert!(!sign.is_unresponsive());
        assert_eq!(intercom.power_cycles(), 1);
    }
}
