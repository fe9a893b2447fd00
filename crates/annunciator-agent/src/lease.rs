//! Sign lease: single-holder access to the device and the display record.
//!
//! The lease is the only way to reach either the sign or [`DisplayState`],
//! so every device-visible transition is ordered by lease acquisition.
//! Release is tied to [`LeaseGuard`] drop and cannot be skipped on an error
//! path. On release the holder publishes a fresh [`DisplaySnapshot`], which
//! readers take without contending for the lease.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use annunciator_core::effects::SignEffects;
use annunciator_core::{AnnunciatorError, DisplayCode, DisplaySnapshot, Result, ShutdownSignal};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::state::DisplayState;

/// Attempts and spacing for [`SignLease::acquire`].
#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    pub attempts: u32,
    pub poll_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            poll_interval: Duration::from_secs(4),
        }
    }
}

pub struct SignLease {
    state: Mutex<DisplayState>,
    sign: Arc<dyn SignEffects>,
    published: watch::Sender<DisplaySnapshot>,
    config: LeaseConfig,
    shutdown: ShutdownSignal,
}

impl SignLease {
    pub fn new(sign: Arc<dyn SignEffects>, config: LeaseConfig, shutdown: ShutdownSignal) -> Self {
        let state = DisplayState::new();
        let (published, _) = watch::channel(state.snapshot());
        Self {
            state: Mutex::new(state),
            sign,
            published,
            config,
            shutdown,
        }
    }

    /// Bounded-wait acquire: polls up to `attempts` times, `poll_interval`
    /// apart. Fails with `LeaseUnavailable`, or `Shutdown` if shutdown cut
    /// the wait short.
    pub async fn acquire(&self) -> Result<LeaseGuard<'_>> {
        let attempts = self.config.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(guard) = self.try_acquire() {
                trace!(attempt, "sign lease acquired");
                return Ok(guard);
            }
            if attempt < attempts && !self.shutdown.sleep(self.config.poll_interval).await {
                return Err(AnnunciatorError::Shutdown);
            }
        }
        warn!(attempts, "sign lease unavailable");
        Err(AnnunciatorError::LeaseUnavailable { attempts })
    }

    /// Single non-waiting attempt. Ignores shutdown.
    pub fn try_acquire(&self) -> Option<LeaseGuard<'_>> {
        let state = self.state.try_lock().ok()?;
        Some(LeaseGuard {
            state,
            sign: self.sign.as_ref(),
            published: &self.published,
        })
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.published.borrow().clone()
    }

    pub fn current_display(&self) -> DisplayCode {
        self.published.borrow().display
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySnapshot> {
        self.published.subscribe()
    }
}

/// Held lease. Derefs to the display record; the sign is reachable through
/// [`LeaseGuard::sign`].
pub struct LeaseGuard<'a> {
    state: MutexGuard<'a, DisplayState>,
    sign: &'a dyn SignEffects,
    published: &'a watch::Sender<DisplaySnapshot>,
}

impl<'a> LeaseGuard<'a> {
    pub fn sign(&self) -> &'a dyn SignEffects {
        self.sign
    }

    /// Release now rather than at end of scope.
    pub fn release(self) {}
}

impl Deref for LeaseGuard<'_> {
    type Target = DisplayState;

    fn deref(&self) -> &DisplayState {
        &self.state
    }
}

impl DerefMut for LeaseGuard<'_> {
    fn deref_mut(&mut self) -> &mut DisplayState {
        &mut self.state
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        let snapshot = self.state.snapshot();
        self.published.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        trace!("sign lease released");
    }
}
