//! Display client listener.
//!
//! One task per accepted connection, one request per connection. Custom
//! message requests are additionally serialised by [`CustomMessageSlot`]: a
//! request that arrives while another is being processed is answered `BUSY`
//! at once instead of queueing for the sign lease.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use annunciator_core::ShutdownSignal;
use annunciator_protocol::{
    query_replies, ClientKind, Command, CommandHeader, CustomMessage, ProtocolError, Reply,
};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::arbiter::{DefaultOutcome, DisplayArbiter};
use crate::config::ServerConfig;
use crate::tasks::TaskRegistry;

/// At most one custom message in flight across all connections.
#[derive(Debug, Default)]
pub struct CustomMessageSlot {
    busy: Mutex<bool>,
}

/// Held slot; released on drop.
#[derive(Debug)]
pub struct SlotClaim<'a> {
    slot: &'a CustomMessageSlot,
}

impl CustomMessageSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_claim(&self) -> Option<SlotClaim<'_>> {
        let mut busy = self.busy.lock();
        if *busy {
            return None;
        }
        *busy = true;
        Some(SlotClaim { slot: self })
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        *self.slot.busy.lock() = false;
    }
}

pub struct ClientProtocolServer {
    config: ServerConfig,
    arbiter: DisplayArbiter,
    slot: CustomMessageSlot,
    tasks: Arc<TaskRegistry>,
    shutdown: ShutdownSignal,
}

impl ClientProtocolServer {
    /// Connections are spawned on `tasks` so a stop waits for them.
    pub fn new(config: ServerConfig, arbiter: DisplayArbiter, tasks: Arc<TaskRegistry>) -> Self {
        let shutdown = tasks.shutdown_signal();
        Self {
            config,
            arbiter,
            slot: CustomMessageSlot::new(),
            tasks,
            shutdown,
        }
    }

    /// Bind the configured address, retrying until it works. Returns `None`
    /// if shutdown came first.
    pub async fn bind_listener(&self) -> Option<TcpListener> {
        let addr = self.config.bind_addr();
        let mut failures = 0u32;
        loop {
            match TcpListener::bind(&addr).await {
                Ok(listener) => {
                    info!(%addr, "client listener bound");
                    return Some(listener);
                }
                Err(err) => {
                    failures = failures.saturating_add(1);
                    let pause = if failures >= self.config.bind_backoff_after {
                        self.config.bind_backoff()
                    } else {
                        self.config.bind_retry()
                    };
                    error!(
                        %addr,
                        error = %err,
                        failures,
                        retry_secs = pause.as_secs(),
                        "client listener bind failed"
                    );
                    if !self.shutdown.sleep(pause).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Bind, then serve until shutdown.
    pub async fn run(self: Arc<Self>) {
        if let Some(listener) = self.bind_listener().await {
            self.serve(listener).await;
        }
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        self.tasks.spawn(async move {
                            server.handle_connection(stream, peer).await;
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        if !self.shutdown.sleep(Duration::from_millis(100)).await {
                            break;
                        }
                    }
                }
            }
        }
        info!("client listener stopped");
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let header = match timeout(
            self.config.request_timeout(),
            CommandHeader::read(&mut stream),
        )
        .await
        {
            Ok(Ok(header)) => header,
            Ok(Err(ProtocolError::UnknownClient(code))) => {
                warn!(%peer, ?code, "unknown client code");
                if let Err(err) = send(&mut stream, None, &Reply::Nak).await {
                    debug!(%peer, error = %err, "reply failed");
                }
                return;
            }
            Ok(Err(err)) => {
                debug!(%peer, error = %err, "request header unreadable");
                return;
            }
            Err(_) => {
                debug!(%peer, "no request header before timeout");
                return;
            }
        };
        debug!(%peer, client = ?header.client, command = ?header.command, "client request");

        let result = if self.arbiter.recovery().is_cycling() {
            send(&mut stream, Some(header.client), &Reply::PowerCycle).await
        } else {
            self.dispatch(&mut stream, header).await
        };
        if let Err(err) = result {
            debug!(%peer, error = %err, "reply failed");
        }
    }

    async fn dispatch(&self, stream: &mut TcpStream, header: CommandHeader) -> std::io::Result<()> {
        let client = header.client;
        match header.command {
            Command::DisplayCustomMessage => self.custom_message(stream, client).await,
            Command::DisplayDefault => {
                let reply = self.display_default().await;
                send(stream, Some(client), &reply).await
            }
            Command::QueryDisplay => {
                for reply in query_replies(client, &self.arbiter.snapshot()) {
                    send(stream, Some(client), &reply).await?;
                }
                Ok(())
            }
            Command::Unknown(code) => {
                warn!(code = ?char::from(code), "unknown command code");
                send(stream, Some(client), &Reply::Nak).await
            }
        }
    }

    async fn custom_message(&self, stream: &mut TcpStream, client: ClientKind) -> std::io::Result<()> {
        let Some(_claim) = self.slot.try_claim() else {
            debug!("custom message already in flight");
            return send(stream, Some(client), &Reply::Busy).await;
        };
        send(stream, Some(client), &Reply::Ack).await?;

        let request = match timeout(self.config.request_timeout(), CustomMessage::read(stream)).await
        {
            Ok(Ok(request)) => request,
            Ok(Err(err)) => {
                warn!(error = %err, "malformed custom message");
                return send(stream, Some(client), &Reply::Nak).await;
            }
            Err(_) => {
                warn!("custom message body not received before timeout");
                return send(stream, Some(client), &Reply::Nak).await;
            }
        };

        let reply = match self.arbiter.display_custom_message(request).await {
            Ok(true) => Reply::Ack,
            Ok(false) => Reply::Nak,
            Err(err) if err.is_lease_unavailable() => Reply::Busy,
            Err(err) if err.is_device() => {
                error!(error = %err, "sign failed showing custom message");
                self.arbiter.start_recovery();
                Reply::Nak
            }
            Err(err) => {
                warn!(error = %err, "custom message not shown");
                Reply::Nak
            }
        };
        send(stream, Some(client), &reply).await
    }

    async fn display_default(&self) -> Reply {
        match self.arbiter.display_default().await {
            Ok(DefaultOutcome::Shown) => Reply::Ack,
            Ok(DefaultOutcome::AlertActive) => Reply::Alert,
            Err(err) if err.is_lease_unavailable() => Reply::Busy,
            Err(err) if err.is_device() => {
                error!(error = %err, "sign failed showing default display");
                self.arbiter.start_recovery();
                Reply::Nak
            }
            Err(err) => {
                warn!(error = %err, "default display not shown");
                Reply::Nak
            }
        }
    }
}

async fn send(
    stream: &mut TcpStream,
    client: Option<ClientKind>,
    reply: &Reply,
) -> std::io::Result<()> {
    stream.write_all(&reply.encode(client)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_admits_one_claim_at_a_time() {
        let slot = CustomMessageSlot::new();
        let claim = slot.try_claim();
        assert!(claim.is_some());
        assert!(slot.try_claim().is_none());

        drop(claim);
        assert!(slot.try_claim().is_some());
    }
}
