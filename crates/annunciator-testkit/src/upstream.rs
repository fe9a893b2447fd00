//! Scripted upstream process-data source.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use annunciator_core::{DrumState, StageCode, DRUM_COUNT};
use annunciator_protocol::upstream::{AlarmsMsg, DrumsMsg};
use annunciator_protocol::{ClientMsg, FramedStream, MsgType, NotifyMsg, UpstreamResponse};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// A valid response with no alarms, no notification and the given stages.
pub fn quiet_response(stages: [StageCode; DRUM_COUNT]) -> UpstreamResponse {
    let mut states = DrumState::all_unset();
    for (state, stage) in states.iter_mut().zip(stages) {
        state.stage = stage;
    }
    UpstreamResponse {
        is_valid: true,
        alarms: AlarmsMsg {
            h2s: Some(false),
            lel: Some(false),
            fire: Some(false),
            deck: Some(0),
        },
        drums: DrumsMsg::from_states(&states),
        notify: Some(NotifyMsg::none()),
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Response(UpstreamResponse),
    /// Bytes framed as-is, for payloads the poller cannot decode
    Raw(Vec<u8>),
}

#[derive(Debug)]
struct UpstreamState {
    response: Payload,
    queued: VecDeque<Payload>,
    received: Vec<ClientMsg>,
}

/// Loopback upstream server. Serves the queued responses first, then the
/// standing one, and records everything the poller sends.
#[derive(Debug)]
pub struct FakeUpstream {
    addr: SocketAddr,
    state: Arc<Mutex<UpstreamState>>,
    task: JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn start(response: UpstreamResponse) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(UpstreamState {
            response: Payload::Response(response),
            queued: VecDeque::new(),
            received: Vec::new(),
        }));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = shared.clone();
                tokio::spawn(async move {
                    let mut framed = FramedStream::new(stream, Duration::from_secs(5));
                    if let Err(err) = serve_cycle(&mut framed, &state).await {
                        debug!(error = %err, "fake upstream cycle ended early");
                    }
                });
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Replace the standing response with a raw payload.
    pub fn set_raw_response(&self, payload: impl Into<Vec<u8>>) {
        self.state.lock().response = Payload::Raw(payload.into());
    }

    /// Serve `response` once, ahead of the standing one.
    pub fn push_response(&self, response: UpstreamResponse) {
        self.state.lock().queued.push_back(Payload::Response(response));
    }

    pub fn received(&self) -> Vec<ClientMsg> {
        self.state.lock().received.clone()
    }

    /// ACK/NAK messages, in order.
    pub fn acknowledgements(&self) -> Vec<ClientMsg> {
        self.received()
            .into_iter()
            .filter(|msg| msg.msg != MsgType::DataRequest)
            .collect()
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_cycle(
    framed: &mut FramedStream<tokio::net::TcpStream>,
    state: &Mutex<UpstreamState>,
) -> Result<(), annunciator_protocol::FrameError> {
    let request: ClientMsg = framed.receive_message().await?;
    let is_request = request.msg == MsgType::DataRequest;
    state.lock().received.push(request);
    if !is_request {
        return Ok(());
    }

    let response = {
        let mut state = state.lock();
        state
            .queued
            .pop_front()
            .unwrap_or_else(|| state.response.clone())
    };
    match response {
        Payload::Response(response) => framed.send_message(&response).await?,
        Payload::Raw(payload) => framed.send_frame(&payload).await?,
    }

    framed.set_timeout(Duration::from_secs(90));
    let ack: ClientMsg = framed.receive_message().await?;
    state.lock().received.push(ack);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn serves_queued_then_standing_response() {
        let upstream = FakeUpstream::start(quiet_response([StageCode::Online; DRUM_COUNT]))
            .await
            .unwrap();
        upstream.push_response(quiet_response([StageCode::Cut; DRUM_COUNT]));

        let mut stages = Vec::new();
        for _ in 0..2 {
            let stream = TcpStream::connect(upstream.addr()).await.unwrap();
            let mut framed = FramedStream::new(stream, Duration::from_secs(5));
            framed.send_message(&ClientMsg::data_request()).await.unwrap();
            let response: UpstreamResponse = framed.receive_message().await.unwrap();
            stages.push(response.drums.validate().unwrap()[0].stage);
            framed.send_message(&ClientMsg::ack(None)).await.unwrap();
        }

        assert_eq!(stages, [StageCode::Cut, StageCode::Online]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(upstream.acknowledgements().len(), 2);
    }
}
