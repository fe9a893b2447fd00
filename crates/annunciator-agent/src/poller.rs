//! Upstream process-data poller.
//!
//! One fresh TCP connection per cycle: send `DATA_REQUEST`, read the framed
//! response, apply it through the arbiter, answer `ACK` or `NAK`. Connection
//! failures are counted; once the count reaches the configured threshold the
//! link-down display is requested.

use std::io::ErrorKind;

use annunciator_core::{has_priority, AnnunciatorError, Deck, DisplayCode, Result, ShutdownSignal};
use annunciator_protocol::{ClientMsg, FrameError, FramedStream, UpstreamResponse};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::arbiter::DisplayArbiter;
use crate::config::UpstreamConfig;

/// Failure to complete the exchange with the upstream source.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("connect timed out")]
    ConnectTimeout,

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Timeout,
    Refused,
    Reset,
    Other,
}

impl PollError {
    fn kind(&self) -> FailureKind {
        let io_kind = |err: &std::io::Error| match err.kind() {
            ErrorKind::ConnectionRefused => FailureKind::Refused,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => FailureKind::Reset,
            ErrorKind::TimedOut => FailureKind::Timeout,
            _ => FailureKind::Other,
        };
        match self {
            PollError::ConnectTimeout | PollError::Frame(FrameError::Timeout(_)) => {
                FailureKind::Timeout
            }
            PollError::Connect(err) | PollError::Frame(FrameError::Io(err)) => io_kind(err),
            PollError::Frame(_) => FailureKind::Other,
        }
    }
}

/// How a completed exchange went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied,
    /// Response rejected and `NAK`ed
    Invalid,
    /// Device error mid-cycle, sign power-cycled
    Recovered,
}

pub struct UpstreamPoller {
    config: UpstreamConfig,
    arbiter: DisplayArbiter,
    shutdown: ShutdownSignal,
    failures: u32,
}

impl UpstreamPoller {
    pub fn new(config: UpstreamConfig, arbiter: DisplayArbiter, shutdown: ShutdownSignal) -> Self {
        Self {
            config,
            arbiter,
            shutdown,
            failures: 0,
        }
    }

    /// Consecutive connection failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Poll until shutdown. Pauses while the sign is being power-cycled.
    pub async fn run(mut self) {
        info!(upstream = %self.config.addr(), "upstream poller started");
        while !self.shutdown.is_shutdown() {
            if self.arbiter.recovery().is_cycling() {
                debug!("power cycle running, poll skipped");
                if !self.shutdown.sleep(self.config.power_cycle_check()).await {
                    break;
                }
                continue;
            }

            match self.poll_once().await {
                Ok(outcome) => {
                    if self.failures > 0 {
                        info!(failures = self.failures, "upstream link restored");
                    }
                    self.failures = 0;
                    if outcome == PollOutcome::Invalid
                        && !self.shutdown.sleep(self.config.invalid_backoff()).await
                    {
                        break;
                    }
                }
                Err(err) => self.record_failure(&err).await,
            }

            if !self.shutdown.sleep(self.config.poll_interval()).await {
                break;
            }
        }
        info!("upstream poller stopped");
    }

    /// One request/response/acknowledge exchange.
    pub async fn poll_once(&self) -> std::result::Result<PollOutcome, PollError> {
        let io_timeout = self.config.io_timeout();
        let stream = tokio::time::timeout(io_timeout, TcpStream::connect(self.config.addr()))
            .await
            .map_err(|_| PollError::ConnectTimeout)?
            .map_err(PollError::Connect)?;
        let mut framed = FramedStream::new(stream, io_timeout);

        framed.send_message(&ClientMsg::data_request()).await?;
        // A frame that arrived whole but does not decode is bad data, not a
        // link failure.
        let response: UpstreamResponse = match framed.receive_message().await {
            Ok(response) => response,
            Err(FrameError::Decode(err)) => {
                warn!(error = %err, "upstream response undecodable");
                framed.send_message(&ClientMsg::nak(None)).await?;
                return Ok(PollOutcome::Invalid);
            }
            Err(err) => return Err(err.into()),
        };
        framed.set_timeout(self.config.ack_timeout());

        let mut received_notify = None;
        match self.apply_response(&response, &mut received_notify).await {
            Ok(()) => {
                framed.send_message(&ClientMsg::ack(received_notify)).await?;
                Ok(PollOutcome::Applied)
            }
            Err(err) if err.is_device() => {
                error!(error = %err, "sign failed during poll cycle");
                if let Err(nak_err) = framed.send_message(&ClientMsg::nak(received_notify)).await {
                    warn!(error = %nak_err, "NAK to upstream failed");
                }
                drop(framed);
                if let Err(recover_err) = self.arbiter.recovery().recover().await {
                    debug!(error = %recover_err, "power cycle abandoned");
                }
                Ok(PollOutcome::Recovered)
            }
            Err(AnnunciatorError::Shutdown) => Ok(PollOutcome::Invalid),
            Err(err) => {
                warn!(error = %err, "upstream response rejected");
                framed.send_message(&ClientMsg::nak(received_notify)).await?;
                Ok(PollOutcome::Invalid)
            }
        }
    }

    /// Validate everything before touching the display, then alarms,
    /// notification, drums and the default display, in that order.
    async fn apply_response(
        &self,
        response: &UpstreamResponse,
        received_notify: &mut Option<String>,
    ) -> Result<()> {
        if !response.is_valid {
            return Err(AnnunciatorError::validation("response marked invalid by upstream"));
        }
        let alarms = response.alarms.validate()?;
        let drums = response.drums.validate()?;

        self.arbiter.check_alarms(alarms).await?;

        if let Some(notify) = response.pending_notification() {
            if has_priority(self.arbiter.current_display(), DisplayCode::Notify) {
                match self.arbiter.display_notify(notify).await {
                    Ok(true) => *received_notify = Some(notify.code.clone()),
                    Ok(false) => {}
                    Err(err) if err.is_lease_unavailable() => {
                        warn!(code = %notify.code, "sign busy, notification skipped");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        tolerate_busy(self.arbiter.update_drums(drums).await, "drum update")?;
        tolerate_busy(
            self.arbiter
                .request_display(DisplayCode::Drums, "", Deck::None)
                .await
                .map(|_| ()),
            "default display",
        )?;
        Ok(())
    }

    async fn record_failure(&mut self, err: &PollError) {
        let kind = err.kind();
        let n = self.failures;
        let should_log = match kind {
            FailureKind::Timeout | FailureKind::Other => n % 15 == 0,
            FailureKind::Refused => n == 20 || n % 400 == 0,
            FailureKind::Reset => true,
        };
        if should_log {
            warn!(
                error = %err,
                kind = ?kind,
                failures = n + 1,
                upstream = %self.config.addr(),
                "upstream poll failed"
            );
        }
        self.failures = n.saturating_add(1);

        if self.failures < self.config.link_down_threshold
            || !has_priority(self.arbiter.current_display(), DisplayCode::Error)
        {
            return;
        }
        match self.arbiter.display_link_down().await {
            Ok(_) => {}
            Err(err) if err.is_device() => {
                error!(error = %err, "sign failed showing link-down display");
                if let Err(recover_err) = self.arbiter.recovery().recover().await {
                    debug!(error = %recover_err, "power cycle abandoned");
                }
            }
            Err(err) => warn!(error = %err, "link-down display not shown"),
        }
    }
}

/// Lease contention means another producer is changing the display; the
/// next cycle repeats the update.
fn tolerate_busy(result: Result<()>, what: &str) -> Result<()> {
    match result {
        Err(err) if err.is_lease_unavailable() => {
            warn!(what, "sign busy, skipped this cycle");
            Ok(())
        }
        other => other,
    }
}
