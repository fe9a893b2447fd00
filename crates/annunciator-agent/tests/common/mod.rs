//! Shared fixtures for annunciator agent integration tests.
#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use annunciator_agent::{
    Annunciator, AnnunciatorConfig, ClientProtocolServer, DisplayArbiter, UpstreamPoller,
};
use annunciator_testkit::{MockIntercom, MockSign};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// Defaults scaled down so socket tests finish in well under a second.
pub fn fast_config() -> AnnunciatorConfig {
    let mut config = AnnunciatorConfig::default();
    config.server.request_timeout_ms = 2_000;
    config.upstream.poll_interval_ms = 10;
    config.upstream.io_timeout_ms = 500;
    config.upstream.ack_timeout_ms = 1_000;
    config.upstream.power_cycle_check_ms = 10;
    config.upstream.invalid_backoff_ms = 10;
    config.sign.lease_poll_ms = 50;
    config.sign.warmup_secs = 0;
    config.sign.recovery_retry_ms = 20;
    config.sign.alarm_off_retry_ms = 20;
    config.revert.check_interval_ms = 20;
    config
}

pub struct Harness {
    pub sign: MockSign,
    pub intercom: MockIntercom,
    pub annunciator: Annunciator,
    pub config: AnnunciatorConfig,
}

impl Harness {
    pub fn new(config: AnnunciatorConfig) -> Self {
        let sign = MockSign::new();
        let intercom = MockIntercom::new();
        let annunciator = Annunciator::new(
            config.clone(),
            Arc::new(sign.clone()),
            Arc::new(intercom.clone()),
        );
        Self {
            sign,
            intercom,
            annunciator,
            config,
        }
    }

    pub fn arbiter(&self) -> &DisplayArbiter {
        self.annunciator.arbiter()
    }

    /// Serve display clients on a loopback port.
    pub async fn serve_clients(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(ClientProtocolServer::new(
            self.config.server.clone(),
            self.arbiter().clone(),
            self.annunciator.tasks().clone(),
        ));
        self.annunciator.tasks().spawn(server.serve(listener));
        addr
    }

    /// Poll `upstream` in the background.
    pub fn start_poller(&self, upstream: SocketAddr) {
        let mut config = self.config.upstream.clone();
        config.host = upstream.ip().to_string();
        config.port = upstream.port();
        let tasks = self.annunciator.tasks();
        let poller = UpstreamPoller::new(config, self.arbiter().clone(), tasks.shutdown_signal());
        tasks.spawn(poller.run());
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.annunciator.trigger_shutdown();
    }
}

/// Send one raw request and collect everything the server writes back
/// before closing the connection.
pub async fn request(addr: SocketAddr, bytes: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8(reply).unwrap()
}

/// Custom message exchange as real clients run it: header, wait for the
/// header `ACK`, then length and body. Returns every reply concatenated.
pub async fn send_custom(addr: SocketAddr, client: u8, body: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[client, b'1']).await.unwrap();

    let mut first = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut byte))
            .await
            .unwrap()
            .unwrap();
        if n == 0 {
            break;
        }
        first.push(byte[0]);
        let text = String::from_utf8_lossy(&first);
        let word = text.trim_end_matches('\n');
        let complete = client != b'B' || text.ends_with('\n');
        if complete && matches!(word, "ACK" | "NAK" | "BUSY" | "POWERCYCLE") {
            break;
        }
    }

    if first.starts_with(b"ACK") {
        let framed = format!("{:03}{body}", body.len());
        stream.write_all(framed.as_bytes()).await.unwrap();
    }
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    first.extend(rest);
    String::from_utf8(first).unwrap()
}

/// A loopback address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
