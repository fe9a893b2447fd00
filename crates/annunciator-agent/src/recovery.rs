//! Power-cycle recovery for an unresponsive sign.
//!
//! The sequence holds the sign lease throughout: cut power through the
//! intercom panel, wait for the sign to boot, then re-push the current
//! display. It is retried until it succeeds or the process shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use annunciator_core::effects::IntercomEffects;
use annunciator_core::{AnnunciatorError, Deck, DisplayCode, Result, RetryPolicy, ShutdownSignal};
use tracing::{debug, error, info};

use crate::lease::SignLease;

pub struct PowerCycleCoordinator {
    lease: Arc<SignLease>,
    intercom: Arc<dyn IntercomEffects>,
    cycling: AtomicBool,
    warmup: Duration,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
}

/// Clears the cycling flag on every exit path.
struct CyclingFlag<'a>(&'a AtomicBool);

impl Drop for CyclingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PowerCycleCoordinator {
    pub fn new(
        lease: Arc<SignLease>,
        intercom: Arc<dyn IntercomEffects>,
        warmup: Duration,
        retry_delay: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            lease,
            intercom,
            cycling: AtomicBool::new(false),
            warmup,
            retry: RetryPolicy::persistent(retry_delay),
            shutdown,
        }
    }

    /// True while a power cycle is running. Clients get `POWERCYCLE` and the
    /// upstream poller pauses.
    pub fn is_cycling(&self) -> bool {
        self.cycling.load(Ordering::SeqCst)
    }

    /// Run the recovery sequence until it succeeds. A call made while
    /// another recovery is running returns immediately.
    pub async fn recover(&self) -> Result<()> {
        if self.cycling.swap(true, Ordering::SeqCst) {
            debug!("power cycle already running");
            return Ok(());
        }
        let _flag = CyclingFlag(&self.cycling);
        error!("sign is not responding, starting power cycle");

        match self
            .retry
            .execute_until_shutdown(&self.shutdown, "sign power cycle", |attempt| {
                self.cycle_once(attempt)
            })
            .await
        {
            Some(Ok(())) => {
                info!("power cycle successful");
                Ok(())
            }
            Some(Err(err)) => Err(err),
            None => Err(AnnunciatorError::Shutdown),
        }
    }

    async fn cycle_once(&self, attempt: u32) -> Result<()> {
        let mut guard = self.lease.acquire().await?;
        debug!(attempt, "power cycling sign");

        self.intercom.power_cycle().await?;
        if !self.shutdown.sleep(self.warmup).await {
            return Err(AnnunciatorError::Shutdown);
        }

        // A stale alert must not come back on its own; the next alarm check
        // raises it again if it is still active.
        if guard.current_display == DisplayCode::Alert {
            guard.current_display = DisplayCode::Drums;
            guard.current_message.clear();
        }

        let display = guard.current_display;
        let message = guard.current_message.clone();
        guard
            .sign()
            .show(display, &message, Deck::None, true)
            .await?;
        Ok(())
    }
}
