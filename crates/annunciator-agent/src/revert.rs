//! Timed reversion of custom messages.
//!
//! Each displayed custom message gets a [`WaitToken`]. The revert task for
//! it only acts if its token is still the latest one issued and the sign is
//! still showing a custom message; anything else means the message was
//! superseded and the task exits at its next check.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use annunciator_core::{DisplayCode, DisplaySnapshot, ShutdownSignal};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Tokens cycle through `1..=WAIT_TOKEN_LIMIT`.
pub const WAIT_TOKEN_LIMIT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken(u32);

impl WaitToken {
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Where a revert goes once it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertTarget {
    /// The drums display
    Default,
    /// Whatever was showing before the custom message
    Restore { display: DisplayCode, message: String },
}

impl RevertTarget {
    /// Only the link-down display is worth restoring; a message that was
    /// replaced by a newer one is over.
    pub fn for_previous(display: DisplayCode, message: &str) -> Self {
        if display == DisplayCode::Error {
            RevertTarget::Restore {
                display,
                message: message.to_string(),
            }
        } else {
            RevertTarget::Default
        }
    }

    pub fn resolve(&self) -> (DisplayCode, &str) {
        match self {
            RevertTarget::Default => (DisplayCode::Drums, ""),
            RevertTarget::Restore { display, message } => (*display, message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    /// Delay elapsed and nothing superseded the message
    Expired,
    /// A newer custom message was displayed
    Superseded,
    /// The sign moved outside the custom message family
    DisplayChanged,
    Shutdown,
}

#[derive(Debug)]
pub struct RevertScheduler {
    latest: AtomicU32,
    check_interval: Duration,
}

impl RevertScheduler {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            latest: AtomicU32::new(0),
            check_interval,
        }
    }

    /// Issue the next token, superseding every earlier one.
    pub fn issue(&self) -> WaitToken {
        let next = |current: u32| {
            Some(if current >= WAIT_TOKEN_LIMIT {
                1
            } else {
                current + 1
            })
        };
        let previous = self
            .latest
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, next)
            .unwrap_or_default();
        WaitToken(next(previous).unwrap_or(1))
    }

    pub fn is_current(&self, token: WaitToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Wait out `delay` for `token`, checking for cancellation every
    /// `check_interval`. If a notification is showing at expiry, keep
    /// waiting until it ends so it is not cut short.
    pub async fn wait(
        &self,
        token: WaitToken,
        delay: Duration,
        mut display: watch::Receiver<DisplaySnapshot>,
        shutdown: &ShutdownSignal,
    ) -> RevertOutcome {
        let deadline = Instant::now() + delay;
        loop {
            if let Some(outcome) = self.cancellation(token, &display, shutdown) {
                debug!(token = token.0, ?outcome, "revert cancelled");
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if !shutdown.sleep(self.check_interval.min(deadline - now)).await {
                return RevertOutcome::Shutdown;
            }
        }

        if !wait_while_showing(&mut display, DisplayCode::Notify, shutdown).await {
            return RevertOutcome::Shutdown;
        }
        self.cancellation(token, &display, shutdown)
            .unwrap_or(RevertOutcome::Expired)
    }

    fn cancellation(
        &self,
        token: WaitToken,
        display: &watch::Receiver<DisplaySnapshot>,
        shutdown: &ShutdownSignal,
    ) -> Option<RevertOutcome> {
        if shutdown.is_shutdown() {
            return Some(RevertOutcome::Shutdown);
        }
        if !self.is_current(token) {
            return Some(RevertOutcome::Superseded);
        }
        let current = display.borrow().display;
        if !current.is_message_family() {
            return Some(RevertOutcome::DisplayChanged);
        }
        None
    }
}

/// Block while the published display is `display`. Returns `false` if
/// shutdown ended the wait.
pub async fn wait_while_showing(
    updates: &mut watch::Receiver<DisplaySnapshot>,
    display: DisplayCode,
    shutdown: &ShutdownSignal,
) -> bool {
    loop {
        if shutdown.is_shutdown() {
            return false;
        }
        if updates.borrow_and_update().display != display {
            return true;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return true;
                }
            }
            _ = shutdown.cancelled() => return false,
        }
    }
}
