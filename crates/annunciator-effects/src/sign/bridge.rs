//! TCP link to the serial bridge in front of the sign.
//!
//! One JSON-encoded [`SignCommand`] per line, one connection per command.
//! The bridge answers with a single line; anything containing `ok` means the
//! sign acknowledged the command.

use std::time::Duration;

use annunciator_core::effects::DeviceError;
use annunciator_core::RetryPolicy;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::command::SignCommand;
use super::driver::SignLink;

/// Bridge connection settings
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// `host:port` of the serial bridge
    pub addr: String,
    /// Bound on connect, write and reply read, each
    pub io_timeout: Duration,
    /// Total tries per command before the sign is declared unresponsive
    pub send_attempts: u32,
    /// Pause between tries
    pub retry_pause: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9100".to_string(),
            io_timeout: Duration::from_secs(5),
            send_attempts: 4,
            retry_pause: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sign replied {0:?}")]
    Rejected(String),
}

/// [`SignLink`] over TCP
#[derive(Debug, Clone)]
pub struct BridgeLink {
    config: BridgeConfig,
}

impl BridgeLink {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    async fn send_once(&self, line: &str) -> Result<(), AttemptError> {
        let io_timeout = self.config.io_timeout;
        let stream = timeout(io_timeout, TcpStream::connect(&self.config.addr))
            .await
            .map_err(|_| AttemptError::Timeout("bridge connect"))??;
        stream.set_nodelay(true)?;

        let (reader, mut writer) = stream.into_split();
        timeout(io_timeout, writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| AttemptError::Timeout("command write"))??;

        let mut reply = String::new();
        timeout(io_timeout, BufReader::new(reader).read_line(&mut reply))
            .await
            .map_err(|_| AttemptError::Timeout("reply read"))??;

        if reply.to_ascii_lowercase().contains("ok") {
            Ok(())
        } else {
            Err(AttemptError::Rejected(reply.trim_end().to_string()))
        }
    }
}

#[async_trait]
impl SignLink for BridgeLink {
    async fn send(&self, command: &SignCommand) -> Result<(), DeviceError> {
        let mut line =
            serde_json::to_string(command).map_err(|e| DeviceError::Link(e.to_string()))?;
        line.push('\n');

        let attempts = self.config.send_attempts.max(1);
        let policy = RetryPolicy::fixed(self.config.retry_pause, attempts - 1);
        let line = line.as_str();

        policy
            .execute(|attempt| async move {
                let result = self.send_once(line).await;
                if let Err(err) = &result {
                    warn!(
                        command = command.name(),
                        attempt = attempt + 1,
                        error = %err,
                        "sign did not acknowledge command"
                    );
                }
                result
            })
            .await
            .map_err(|_| DeviceError::Unresponsive {
                command: command.name().to_string(),
                attempts,
            })?;

        debug!(command = command.name(), "sign acknowledged command");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Bridge that answers every command with `reply`, counting connections.
    async fn spawn_bridge(reply: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                seen.fetch_add(1, Ordering::SeqCst);
                let (reader, mut writer) = stream.into_split();
                let mut line = String::new();
                let _ = BufReader::new(reader).read_line(&mut line).await;
                let _ = writer.write_all(reply.as_bytes()).await;
            }
        });
        (addr, count)
    }

    fn config(addr: String) -> BridgeConfig {
        BridgeConfig {
            addr,
            io_timeout: Duration::from_secs(2),
            send_attempts: 3,
            retry_pause: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn acknowledged_command_succeeds_first_try() {
        let (addr, count) = spawn_bridge("ok\n").await;
        let link = BridgeLink::new(config(addr));

        link.send(&SignCommand::Reset).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_command_becomes_device_error() {
        let (addr, count) = spawn_bridge("err\n").await;
        let link = BridgeLink::new(config(addr));

        let err = link.send(&SignCommand::Reset).await.unwrap_err();
        assert_eq!(
            err,
            DeviceError::Unresponsive {
                command: "reset".into(),
                attempts: 3
            }
        );
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
