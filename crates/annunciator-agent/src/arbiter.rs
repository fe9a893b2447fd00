//! Display arbitration.
//!
//! [`DisplayArbiter`] is the only writer of the display record. Every request
//! is checked against the priority table, then applied to the sign while the
//! lease is held. The arbiter is a cheap clone: all state is shared.

use std::sync::Arc;
use std::time::Duration;

use annunciator_core::effects::IntercomEffects;
use annunciator_core::{
    has_priority, AlarmState, AnnunciatorError, Deck, DisplayCode, DisplaySnapshot,
    DrumPosition, DrumState, Result, RetryPolicy, ShutdownSignal, StageCode, Timer, DRUM_COUNT,
};
use annunciator_protocol::{CustomMessage, NotifyMsg};
use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::LINK_DOWN_MESSAGE;
use crate::lease::{LeaseGuard, SignLease};
use crate::recovery::PowerCycleCoordinator;
use crate::revert::{wait_while_showing, RevertOutcome, RevertScheduler, RevertTarget, WaitToken};
use crate::tasks::TaskRegistry;

/// Result of a display-default request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOutcome {
    /// Drums are showing
    Shown,
    /// Refused, an alert is active
    AlertActive,
}

#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    /// Text of the link-down display
    pub link_down_message: String,
    /// Pause between attempts of the paths that retry until success
    /// (alarm-off reversion, sign initialisation)
    pub retry_pause: Duration,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            link_down_message: LINK_DOWN_MESSAGE.to_string(),
            retry_pause: Duration::from_secs(1),
        }
    }
}

/// Intercom work collected under the lease and emitted after release.
enum DrumEvent {
    Stage(DrumPosition, StageCode),
    Timer(DrumPosition, Timer, Duration),
    Light(DrumPosition, StageCode),
}

#[derive(Clone)]
pub struct DisplayArbiter {
    lease: Arc<SignLease>,
    intercom: Arc<dyn IntercomEffects>,
    reverts: Arc<RevertScheduler>,
    recovery: Arc<PowerCycleCoordinator>,
    tasks: Arc<TaskRegistry>,
    settings: Arc<ArbiterSettings>,
    shutdown: ShutdownSignal,
}

impl DisplayArbiter {
    pub fn new(
        lease: Arc<SignLease>,
        intercom: Arc<dyn IntercomEffects>,
        reverts: Arc<RevertScheduler>,
        recovery: Arc<PowerCycleCoordinator>,
        tasks: Arc<TaskRegistry>,
        settings: ArbiterSettings,
    ) -> Self {
        let shutdown = tasks.shutdown_signal();
        Self {
            lease,
            intercom,
            reverts,
            recovery,
            tasks,
            settings: Arc::new(settings),
            shutdown,
        }
    }

    pub fn current_display(&self) -> DisplayCode {
        self.lease.current_display()
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        self.lease.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySnapshot> {
        self.lease.subscribe()
    }

    pub fn recovery(&self) -> &Arc<PowerCycleCoordinator> {
        &self.recovery
    }

    /// Show `requested` if it outranks what is showing. Returns `false` when
    /// the request lost the priority check; the sign is not touched then.
    pub async fn request_display(
        &self,
        requested: DisplayCode,
        message: &str,
        deck: Deck,
    ) -> Result<bool> {
        if !has_priority(self.lease.current_display(), requested) {
            debug!(%requested, "display request refused");
            return Ok(false);
        }
        let mut guard = self.lease.acquire().await?;
        // Another holder may have changed the display while we waited.
        if !has_priority(guard.current_display, requested) {
            debug!(%requested, current = %guard.current_display, "display request refused");
            return Ok(false);
        }
        Self::apply(&mut guard, requested, message, deck).await?;
        Ok(true)
    }

    /// Push `requested` to the sign and record it. The display script is only
    /// restarted when the display actually changes.
    async fn apply(
        guard: &mut LeaseGuard<'_>,
        requested: DisplayCode,
        message: &str,
        deck: Deck,
    ) -> Result<()> {
        let restart = guard.current_display != requested;
        guard.sign().show(requested, message, deck, restart).await?;

        guard.current_message = if requested == DisplayCode::Alert {
            AlarmState {
                deck,
                ..guard.alarms
            }
            .alert_message(message)
        } else {
            message.to_string()
        };
        if restart {
            info!(from = %guard.current_display, to = %requested, "display changed");
        }
        guard.current_display = requested;
        Ok(())
    }

    /// Client display-default: return to drums unless an alert is active.
    pub async fn display_default(&self) -> Result<DefaultOutcome> {
        let mut guard = self.lease.acquire().await?;
        match guard.current_display {
            DisplayCode::Alert => Ok(DefaultOutcome::AlertActive),
            DisplayCode::Drums => Ok(DefaultOutcome::Shown),
            _ => {
                Self::apply(&mut guard, DisplayCode::Drums, "", Deck::None).await?;
                Ok(DefaultOutcome::Shown)
            }
        }
    }

    /// Apply one poll cycle's drum records as a single batch.
    ///
    /// Without a timer, a changed stage (or a timer that just cleared) is
    /// pushed to the sign. With a timer, a countdown is pushed when the timer
    /// kind changes and the stage image stays hidden until it clears. Lights
    /// are refreshed for every position.
    pub async fn update_drums(&self, drums: [DrumState; DRUM_COUNT]) -> Result<()> {
        let mut guard = self.lease.acquire().await?;
        let sign = guard.sign();
        let now = Local::now().naive_local();
        let announce_stages = guard.current_display == DisplayCode::Drums && !guard.booting;
        let mut events = Vec::new();

        for new in drums {
            let position = new.position;
            let idx = position.index();
            let stored = guard.drums[idx].clone();

            if !new.timer.is_active() {
                let timer_cleared = stored.timer.is_active();
                if stored.stage != new.stage || timer_cleared {
                    sign.set_stage(position, new.stage).await?;
                    if stored.stage != new.stage {
                        info!(drum = %position, stage = ?new.stage, "drum stage changed");
                        if announce_stages && stored.stage != StageCode::Unset {
                            events.push(DrumEvent::Stage(position, new.stage));
                        }
                    }
                    guard.drums[idx].stage = new.stage;
                    guard.drums[idx].timer = Timer::none();
                }
            } else {
                if stored.timer.kind != new.timer.kind {
                    let remaining = new.timer.remaining(now);
                    sign.set_timer(position, &new.timer, remaining).await?;
                    info!(
                        drum = %position,
                        remaining_secs = remaining.as_secs(),
                        "drum timer started"
                    );
                    events.push(DrumEvent::Timer(position, new.timer.clone(), remaining));
                }
                guard.drums[idx].timer = new.timer;
            }
            events.push(DrumEvent::Light(position, new.stage));
        }
        guard.booting = false;
        guard.release();

        for event in events {
            match event {
                DrumEvent::Stage(position, stage) => {
                    self.intercom.announce_stage(position, stage).await
                }
                DrumEvent::Timer(position, timer, remaining) => {
                    self.intercom.announce_timer(position, &timer, remaining).await
                }
                DrumEvent::Light(position, stage) => {
                    self.intercom.update_light(position, stage).await
                }
            }
        }
        Ok(())
    }

    /// Raise or clear the alert for the latest alarm flags. Returns the
    /// active-alarm list, empty when no alarm is active.
    pub async fn check_alarms(&self, alarms: AlarmState) -> Result<String> {
        let active = alarms.active_list();
        if alarms.any_active() {
            self.raise_alert(alarms, &active).await?;
        } else if self.lease.current_display() == DisplayCode::Alert {
            self.clear_alert(alarms).await?;
        }
        Ok(active)
    }

    async fn raise_alert(&self, alarms: AlarmState, active: &str) -> Result<()> {
        let mut guard = match self.lease.acquire().await {
            Ok(guard) => guard,
            Err(err) if err.is_lease_unavailable() => {
                warn!(alarms = %active.trim_end(), "sign busy, alert deferred to next cycle");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let message = alarms.alert_message(active);
        if guard.current_display == DisplayCode::Alert && guard.current_message == message {
            guard.alarms = alarms;
            return Ok(());
        }

        guard.alarms = alarms;
        Self::apply(&mut guard, DisplayCode::Alert, active, alarms.deck).await?;
        guard.release();

        warn!(alert = %message, "alert raised");
        self.intercom.play_alert(&message).await;
        Ok(())
    }

    /// Take the sign off the alert. Retried until it succeeds or the process
    /// shuts down; a device error power-cycles the sign before the next try.
    async fn clear_alert(&self, alarms: AlarmState) -> Result<()> {
        let outcome = RetryPolicy::persistent(self.settings.retry_pause)
            .execute_until_shutdown(&self.shutdown, "alarm-off reversion", |_| async move {
                let result = self.try_clear_alert(alarms).await;
                if let Err(err) = &result {
                    if err.is_device() {
                        self.recover_inline().await;
                    }
                }
                result
            })
            .await;
        outcome.unwrap_or(Err(AnnunciatorError::Shutdown))
    }

    async fn try_clear_alert(&self, alarms: AlarmState) -> Result<()> {
        let mut guard = self.lease.acquire().await?;
        guard.alarms = alarms;
        if guard.current_display == DisplayCode::Alert {
            Self::apply(&mut guard, DisplayCode::Drums, "", Deck::None).await?;
            info!("alarms cleared");
        }
        Ok(())
    }

    /// Show an upstream notification for its display time, then restore the
    /// previous display. Returns `false` if the notification lost the
    /// priority check.
    pub async fn display_notify(&self, notify: &NotifyMsg) -> Result<bool> {
        let mut guard = self.lease.acquire().await?;
        if !has_priority(guard.current_display, DisplayCode::Notify) {
            return Ok(false);
        }
        let previous = match guard.current_display {
            DisplayCode::Drums | DisplayCode::Error => (DisplayCode::Drums, String::new()),
            display => (display, guard.current_message.clone()),
        };
        Self::apply(&mut guard, DisplayCode::Notify, &notify.sign_msg, Deck::None).await?;
        guard.release();

        info!(code = %notify.code, secs = notify.display_time, "notification shown");
        self.intercom
            .announce_message(DisplayCode::Notify, &notify.ts_msg)
            .await;
        if !self.shutdown.sleep(notify.display_duration()).await {
            return Ok(true);
        }

        let mut guard = match self.lease.acquire().await {
            Ok(guard) => guard,
            Err(err) if err.is_lease_unavailable() => {
                warn!(code = %notify.code, "sign busy, notification left to be replaced");
                return Ok(true);
            }
            Err(err) => return Err(err),
        };
        if guard.current_display == DisplayCode::Notify {
            let (display, message) = previous;
            Self::apply(&mut guard, display, &message, Deck::None).await?;
        }
        Ok(true)
    }

    /// Switch to the link-down display if it outranks what is showing. The
    /// same lease hold clears the alarms and blanks every drum stage.
    pub async fn display_link_down(&self) -> Result<bool> {
        let mut guard = self.lease.acquire().await?;
        if !has_priority(guard.current_display, DisplayCode::Error) {
            return Ok(false);
        }
        let sign = guard.sign();
        let message = self.settings.link_down_message.clone();
        Self::apply(&mut guard, DisplayCode::Error, &message, Deck::None).await?;
        guard.alarms = AlarmState::default();
        for position in DrumPosition::ALL {
            sign.set_stage(position, StageCode::Unset).await?;
            guard.drums[position.index()] = DrumState::unset(position);
        }
        error!("upstream link down, drum stages unknown");
        Ok(true)
    }

    /// Show a client custom message and schedule its revert. Waits for a
    /// showing notification to end first.
    pub async fn display_custom_message(&self, request: CustomMessage) -> Result<bool> {
        if !has_priority(self.lease.current_display(), request.display) {
            return Ok(false);
        }
        let mut updates = self.lease.subscribe();
        if !wait_while_showing(&mut updates, DisplayCode::Notify, &self.shutdown).await {
            return Err(AnnunciatorError::Shutdown);
        }

        let mut guard = self.lease.acquire().await?;
        if !has_priority(guard.current_display, request.display) {
            return Ok(false);
        }
        let target = RevertTarget::for_previous(guard.current_display, &guard.current_message);
        Self::apply(&mut guard, request.display, &request.text, Deck::None).await?;
        let token = self.reverts.issue();
        guard.release();

        info!(
            display = %request.display,
            token = token.value(),
            secs = request.duration.as_secs(),
            "custom message shown"
        );
        self.spawn_revert(token, request.duration, target);
        self.intercom
            .announce_message(request.display, &request.text)
            .await;
        Ok(true)
    }

    fn spawn_revert(&self, token: WaitToken, delay: Duration, target: RevertTarget) {
        let arbiter = self.clone();
        let updates = self.lease.subscribe();
        self.tasks.spawn(async move {
            arbiter.run_revert(token, delay, target, updates).await;
        });
    }

    async fn run_revert(
        &self,
        token: WaitToken,
        delay: Duration,
        target: RevertTarget,
        updates: watch::Receiver<DisplaySnapshot>,
    ) {
        let outcome = self
            .reverts
            .wait(token, delay, updates, &self.shutdown)
            .await;
        if outcome != RevertOutcome::Expired {
            return;
        }

        // A busy lease means someone else is already changing the display.
        let mut guard = match self.lease.acquire().await {
            Ok(guard) => guard,
            Err(err) => {
                debug!(token = token.value(), error = %err, "revert dropped");
                return;
            }
        };
        if !self.reverts.is_current(token) || !guard.current_display.is_custom_message() {
            return;
        }

        let (restored, message) = target.resolve();
        match Self::apply(&mut guard, restored, message, Deck::None).await {
            Ok(()) => info!(token = token.value(), %restored, "custom message reverted"),
            Err(err) => {
                guard.release();
                warn!(token = token.value(), error = %err, "revert failed");
                if err.is_device() {
                    self.start_recovery();
                }
            }
        }
    }

    /// Start a power cycle in the background unless one is running.
    pub fn start_recovery(&self) {
        if self.recovery.is_cycling() {
            return;
        }
        let recovery = self.recovery.clone();
        self.tasks.spawn(async move {
            if let Err(err) = recovery.recover().await {
                debug!(error = %err, "power cycle abandoned");
            }
        });
    }

    async fn recover_inline(&self) {
        if let Err(err) = self.recovery.recover().await {
            debug!(error = %err, "power cycle abandoned");
        }
    }

    /// Blank every drum and start the drums script. Retried until it
    /// succeeds or the process shuts down.
    pub async fn initialize(&self) -> Result<()> {
        let outcome = RetryPolicy::persistent(self.settings.retry_pause)
            .execute_until_shutdown(&self.shutdown, "sign initialisation", |_| async move {
                let result = self.try_initialize().await;
                if let Err(err) = &result {
                    if err.is_device() {
                        self.recover_inline().await;
                    }
                }
                result
            })
            .await;
        outcome.unwrap_or(Err(AnnunciatorError::Shutdown))
    }

    async fn try_initialize(&self) -> Result<()> {
        let mut guard = self.lease.acquire().await?;
        let sign = guard.sign();
        for position in DrumPosition::ALL {
            sign.set_stage(position, StageCode::Unset).await?;
        }
        guard.drums = DrumState::all_unset();
        sign.show(DisplayCode::Drums, "", Deck::None, true).await?;
        guard.current_display = DisplayCode::Drums;
        guard.current_message.clear();
        info!("sign initialised");
        Ok(())
    }

    /// Stop the sign's script. Only attempted if the lease is free.
    pub async fn stop(&self) {
        let Some(guard) = self.lease.try_acquire() else {
            warn!("sign busy at shutdown, left running");
            return;
        };
        match guard.sign().reset().await {
            Ok(()) => info!("sign reset"),
            Err(err) => warn!(error = %err, "sign reset failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseConfig;
    use annunciator_core::TimerKind;
    use annunciator_testkit::{IntercomCall, MockIntercom, MockSign, SignCall};
    use chrono::Duration as ChronoDuration;

    struct Harness {
        sign: MockSign,
        intercom: MockIntercom,
        arbiter: DisplayArbiter,
        _tasks: Arc<TaskRegistry>,
    }

    fn harness() -> Harness {
        let sign = MockSign::new();
        let intercom = MockIntercom::new();
        let tasks = Arc::new(TaskRegistry::new());
        let lease = Arc::new(SignLease::new(
            Arc::new(sign.clone()),
            LeaseConfig::default(),
            tasks.shutdown_signal(),
        ));
        let recovery = Arc::new(PowerCycleCoordinator::new(
            lease.clone(),
            Arc::new(intercom.clone()),
            Duration::from_secs(60),
            Duration::from_secs(5),
            tasks.shutdown_signal(),
        ));
        let arbiter = DisplayArbiter::new(
            lease,
            Arc::new(intercom.clone()),
            Arc::new(RevertScheduler::new(Duration::from_millis(500))),
            recovery,
            tasks.clone(),
            ArbiterSettings::default(),
        );
        Harness {
            sign,
            intercom,
            arbiter,
            _tasks: tasks,
        }
    }

    fn drums_with(stages: [StageCode; DRUM_COUNT]) -> [DrumState; DRUM_COUNT] {
        let mut drums = DrumState::all_unset();
        for (drum, stage) in drums.iter_mut().zip(stages) {
            drum.stage = stage;
        }
        drums
    }

    fn alarms(fire: bool, h2s: bool) -> AlarmState {
        AlarmState {
            fire,
            h2s,
            lel: false,
            deck: Deck::Switch,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refused_request_leaves_sign_untouched() {
        let h = harness();
        assert!(h.arbiter.check_alarms(alarms(true, false)).await.is_ok());
        h.sign.clear();

        let accepted = h
            .arbiter
            .request_display(DisplayCode::MsgInfo, "Drill", Deck::None)
            .await
            .unwrap();

        assert!(!accepted);
        assert!(h.sign.calls().is_empty());
        assert_eq!(h.arbiter.current_display(), DisplayCode::Alert);
    }

    #[tokio::test(start_paused = true)]
    async fn same_display_rewrites_content_without_restart() {
        let h = harness();
        for text in ["first", "second"] {
            h.arbiter
                .request_display(DisplayCode::MsgWarning, text, Deck::None)
                .await
                .unwrap();
        }

        assert_eq!(h.sign.script_starts(), vec![DisplayCode::MsgWarning]);
        assert_eq!(
            h.sign.shows().last(),
            Some(&(DisplayCode::MsgWarning, "second".to_string()))
        );
        assert_eq!(h.arbiter.snapshot().message, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn alert_is_played_once_per_change() {
        let h = harness();
        for _ in 0..3 {
            h.arbiter.check_alarms(alarms(true, false)).await.unwrap();
        }
        let list = h.arbiter.check_alarms(alarms(true, true)).await.unwrap();

        assert_eq!(list, "FIRE & H2S ");
        assert_eq!(
            h.intercom.alerts(),
            vec![
                "FIRE detected on SWITCH deck".to_string(),
                "FIRE & H2S detected on SWITCH deck".to_string(),
            ]
        );
        assert_eq!(h.sign.script_starts(), vec![DisplayCode::Alert]);
        assert_eq!(h.arbiter.snapshot().message, "FIRE & H2S detected on SWITCH deck");
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_alarms_returns_to_drums() {
        let h = harness();
        h.arbiter.check_alarms(alarms(true, false)).await.unwrap();
        let list = h.arbiter.check_alarms(AlarmState::default()).await.unwrap();

        assert_eq!(list, "");
        assert_eq!(h.arbiter.current_display(), DisplayCode::Drums);
        assert_eq!(
            h.sign.script_starts(),
            vec![DisplayCode::Alert, DisplayCode::Drums]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_off_retries_through_device_failure() {
        let h = harness();
        h.intercom.heal_on_power_cycle(&h.sign);
        h.arbiter.check_alarms(alarms(false, true)).await.unwrap();
        h.sign.set_unresponsive(true);

        h.arbiter.check_alarms(AlarmState::default()).await.unwrap();

        assert_eq!(h.intercom.power_cycles(), 1);
        assert_eq!(h.arbiter.current_display(), DisplayCode::Drums);
    }

    #[tokio::test(start_paused = true)]
    async fn stage_changes_are_muted_while_booting() {
        let h = harness();
        h.arbiter
            .update_drums(drums_with([StageCode::Online; DRUM_COUNT]))
            .await
            .unwrap();
        let mut stages = [StageCode::Online; DRUM_COUNT];
        stages[2] = StageCode::Vent;
        h.arbiter.update_drums(drums_with(stages)).await.unwrap();

        // First batch comes from Unset during boot, second is a real change.
        let announced: Vec<_> = h
            .intercom
            .calls()
            .into_iter()
            .filter(|call| matches!(call, IntercomCall::Stage(..)))
            .collect();
        assert_eq!(
            announced,
            vec![IntercomCall::Stage(DrumPosition::D2A, StageCode::Vent)]
        );
        assert_eq!(
            h.intercom
                .count(|call| matches!(call, IntercomCall::Light(..))),
            2 * DRUM_COUNT
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_stage_is_not_pushed() {
        let h = harness();
        let drums = drums_with([StageCode::Steam; DRUM_COUNT]);
        h.arbiter.update_drums(drums.clone()).await.unwrap();
        h.sign.clear();

        h.arbiter.update_drums(drums).await.unwrap();
        assert!(h.sign.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_hides_stage_until_it_clears() {
        let h = harness();
        let mut drums = drums_with([StageCode::Drain; DRUM_COUNT]);
        h.arbiter.update_drums(drums.clone()).await.unwrap();
        h.sign.clear();

        drums[0].timer = Timer {
            kind: TimerKind::Iso,
            start: Some(Local::now().naive_local() - ChronoDuration::minutes(5)),
            duration_minutes: 30,
            details: "V-12".into(),
        };
        drums[0].stage = StageCode::Quench;
        h.arbiter.update_drums(drums.clone()).await.unwrap();
        h.arbiter.update_drums(drums.clone()).await.unwrap();

        let calls = h.sign.calls();
        assert_eq!(calls.len(), 1);
        let SignCall::Timer {
            position,
            kind,
            remaining,
        } = &calls[0]
        else {
            panic!("expected a countdown, got {calls:?}");
        };
        assert_eq!(*position, DrumPosition::D1A);
        assert_eq!(*kind, TimerKind::Iso);
        assert!(*remaining <= Duration::from_secs(25 * 60));
        assert!(*remaining > Duration::from_secs(24 * 60));
        assert_eq!(h.arbiter.snapshot().drums[0].stage, StageCode::Drain);

        // Timer clears: the stage image comes back even if it had not changed.
        h.sign.clear();
        drums[0].timer = Timer::none();
        drums[0].stage = StageCode::Drain;
        h.arbiter.update_drums(drums).await.unwrap();
        assert_eq!(
            h.sign.calls(),
            vec![SignCall::Stage {
                position: DrumPosition::D1A,
                stage: StageCode::Drain,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn link_down_blanks_drums_once() {
        let h = harness();
        h.arbiter
            .update_drums(drums_with([StageCode::Cut; DRUM_COUNT]))
            .await
            .unwrap();

        assert!(h.arbiter.display_link_down().await.unwrap());
        assert!(!h.arbiter.display_link_down().await.unwrap());

        let snapshot = h.arbiter.snapshot();
        assert_eq!(snapshot.display, DisplayCode::Error);
        assert_eq!(snapshot.message, LINK_DOWN_MESSAGE);
        assert!(snapshot.drums.iter().all(|d| d.stage == StageCode::Unset));
        assert_eq!(h.sign.script_starts(), vec![DisplayCode::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn notification_restores_drums_after_display_time() {
        let h = harness();
        let notify = NotifyMsg {
            code: "N17".into(),
            sign_msg: "Crane moving".into(),
            ts_msg: "Attention, crane moving".into(),
            display_time: 20,
        };

        let started = tokio::time::Instant::now();
        assert!(h.arbiter.display_notify(&notify).await.unwrap());

        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(
            h.sign.script_starts(),
            vec![DisplayCode::Notify, DisplayCode::Drums]
        );
        assert!(h.intercom.calls().contains(&IntercomCall::Message(
            DisplayCode::Notify,
            "Attention, crane moving".into()
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn display_default_refuses_during_alert() {
        let h = harness();
        h.arbiter
            .request_display(DisplayCode::MsgDanger, "Evacuate", Deck::None)
            .await
            .unwrap();
        assert_eq!(
            h.arbiter.display_default().await.unwrap(),
            DefaultOutcome::Shown
        );
        assert_eq!(h.arbiter.current_display(), DisplayCode::Drums);

        h.arbiter.check_alarms(alarms(true, false)).await.unwrap();
        assert_eq!(
            h.arbiter.display_default().await.unwrap(),
            DefaultOutcome::AlertActive
        );
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_blanks_every_drum_and_starts_script() {
        let h = harness();
        h.arbiter.initialize().await.unwrap();

        let calls = h.sign.calls();
        assert_eq!(calls.len(), DRUM_COUNT + 1);
        assert!(calls[..DRUM_COUNT]
            .iter()
            .all(|call| matches!(call, SignCall::Stage { stage: StageCode::Unset, .. })));
        assert_eq!(h.sign.script_starts(), vec![DisplayCode::Drums]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_sign() {
        let h = harness();
        h.arbiter.stop().await;
        assert_eq!(h.sign.calls(), vec![SignCall::Reset]);
    }
}
