//! Upstream poller against a scripted loopback source.
#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use annunciator_core::{DisplayCode, DrumPosition, StageCode, DRUM_COUNT};
use annunciator_protocol::upstream::AlarmsMsg;
use annunciator_protocol::{MsgType, NotifyMsg, UpstreamResponse};
use annunciator_testkit::{quiet_response, FakeUpstream, IntercomCall, SignCall};
use common::{closed_port, fast_config, wait_until, Harness};
use tokio::net::TcpListener;

#[tokio::test]
async fn applies_stages_and_acknowledges() {
    let h = Harness::new(fast_config());
    let upstream = FakeUpstream::start(quiet_response([StageCode::Cut; DRUM_COUNT]))
        .await
        .unwrap();
    h.start_poller(upstream.addr());

    wait_until("drum stages", || {
        h.arbiter()
            .snapshot()
            .drums
            .iter()
            .all(|drum| drum.stage == StageCode::Cut)
    })
    .await;
    wait_until("acknowledgement", || !upstream.acknowledgements().is_empty()).await;

    assert_eq!(upstream.acknowledgements()[0].msg, MsgType::Ack);
    assert!(h
        .intercom
        .calls()
        .contains(&IntercomCall::Light(DrumPosition::D3B, StageCode::Cut)));
    // Stages are known from the first batch, nothing is announced for it.
    assert_eq!(
        h.intercom
            .count(|call| matches!(call, IntercomCall::Stage(..))),
        0
    );
}

#[tokio::test]
async fn link_down_is_shown_once_after_threshold() {
    let h = Harness::new(fast_config());
    h.start_poller(closed_port().await);

    wait_until("link-down display", || {
        h.arbiter().current_display() == DisplayCode::Error
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let error_shows = h
        .sign
        .shows()
        .into_iter()
        .filter(|(display, _)| *display == DisplayCode::Error)
        .count();
    assert_eq!(error_shows, 1);
    assert_eq!(
        h.sign
            .calls()
            .iter()
            .filter(|call| matches!(call, SignCall::Stage { stage: StageCode::Unset, .. }))
            .count(),
        DRUM_COUNT
    );
}

#[tokio::test]
async fn link_down_waits_for_threshold() {
    let mut config = fast_config();
    config.upstream.poll_interval_ms = 50;
    let h = Harness::new(config);
    h.start_poller(closed_port().await);

    // Well short of twenty failures at this interval.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.arbiter().current_display(), DisplayCode::Drums);
}

#[tokio::test]
async fn device_error_naks_then_power_cycles() {
    let h = Harness::new(fast_config());
    h.intercom.heal_on_power_cycle(&h.sign);
    h.sign.set_unresponsive(true);
    let upstream = FakeUpstream::start(quiet_response([StageCode::Online; DRUM_COUNT]))
        .await
        .unwrap();
    h.start_poller(upstream.addr());

    wait_until("acknowledged cycle after recovery", || {
        upstream
            .acknowledgements()
            .iter()
            .any(|msg| msg.msg == MsgType::Ack)
    })
    .await;

    let acks = upstream.acknowledgements();
    assert_eq!(acks[0].msg, MsgType::Nak);
    assert_eq!(h.intercom.power_cycles(), 1);
    assert!(h
        .arbiter()
        .snapshot()
        .drums
        .iter()
        .all(|drum| drum.stage == StageCode::Online));
}

#[tokio::test]
async fn notification_is_shown_and_acknowledged_by_code() {
    let h = Harness::new(fast_config());
    let quiet = quiet_response([StageCode::Online; DRUM_COUNT]);
    let upstream = FakeUpstream::start(quiet.clone()).await.unwrap();
    upstream.push_response(UpstreamResponse {
        notify: Some(NotifyMsg {
            code: "N12".into(),
            sign_msg: "Crane lift".into(),
            ts_msg: "Crane lift on the cut deck".into(),
            display_time: 1,
        }),
        ..quiet
    });
    h.start_poller(upstream.addr());

    wait_until("notification acknowledgement", || {
        upstream
            .acknowledgements()
            .iter()
            .any(|msg| msg.received_notify.as_deref() == Some("N12"))
    })
    .await;

    assert_eq!(
        h.sign.script_starts(),
        vec![DisplayCode::Notify, DisplayCode::Drums]
    );
    assert_eq!(h.arbiter().current_display(), DisplayCode::Drums);
}

#[tokio::test]
async fn alarm_raises_then_clears_alert() {
    let h = Harness::new(fast_config());
    let quiet = quiet_response([StageCode::Steam; DRUM_COUNT]);
    let upstream = FakeUpstream::start(quiet.clone()).await.unwrap();
    upstream.push_response(UpstreamResponse {
        alarms: AlarmsMsg {
            h2s: Some(false),
            lel: Some(true),
            fire: Some(true),
            deck: Some(2),
        },
        ..quiet
    });
    h.start_poller(upstream.addr());

    wait_until("alert raised", || !h.intercom.alerts().is_empty()).await;
    wait_until("alert cleared", || {
        h.arbiter().current_display() == DisplayCode::Drums
    })
    .await;

    assert_eq!(h.intercom.alerts(), vec!["FIRE & LEL detected on CUT deck"]);
    assert_eq!(
        h.sign.script_starts(),
        vec![DisplayCode::Alert, DisplayCode::Drums]
    );
}

#[tokio::test]
async fn invalid_response_is_naked_without_touching_sign() {
    let h = Harness::new(fast_config());
    let mut bad = quiet_response([StageCode::Vent; DRUM_COUNT]);
    bad.alarms.fire = None;
    let upstream = FakeUpstream::start(bad).await.unwrap();
    h.start_poller(upstream.addr());

    wait_until("rejection", || upstream.acknowledgements().len() >= 2).await;

    assert!(upstream
        .acknowledgements()
        .iter()
        .all(|msg| msg.msg == MsgType::Nak));
    assert!(h.sign.calls().is_empty());
}

#[tokio::test]
async fn undecodable_response_is_naked_and_not_a_link_failure() {
    let h = Harness::new(fast_config());
    let upstream = FakeUpstream::start(quiet_response([StageCode::Online; DRUM_COUNT]))
        .await
        .unwrap();
    // Drum record without a stage.
    upstream.set_raw_response(r#"{"is_valid":true,"drums":{"D1A":{}}}"#);
    h.start_poller(upstream.addr());

    let threshold = h.config.upstream.link_down_threshold as usize;
    wait_until("rejections past the link-down threshold", || {
        upstream.acknowledgements().len() > threshold
    })
    .await;

    assert!(upstream
        .acknowledgements()
        .iter()
        .all(|msg| msg.msg == MsgType::Nak && msg.received_notify.is_none()));
    assert_eq!(h.arbiter().current_display(), DisplayCode::Drums);
    assert!(h.sign.calls().is_empty());
}

#[tokio::test]
async fn runtime_starts_and_resets_sign_on_stop() {
    let upstream = FakeUpstream::start(quiet_response([StageCode::Drain; DRUM_COUNT]))
        .await
        .unwrap();
    let mut config = fast_config();
    config.upstream.host = upstream.addr().ip().to_string();
    config.upstream.port = upstream.addr().port();
    let h = Harness::new(config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    h.annunciator.start_with_listener(listener).await.unwrap();
    wait_until("first cycle", || !upstream.acknowledgements().is_empty()).await;
    assert_eq!(common::request(addr, b"B3").await, "0\n5_5_5_5_5_5\n");

    h.annunciator.stop(Duration::from_secs(2)).await;
    assert_eq!(h.sign.calls().last(), Some(&SignCall::Reset));
    assert_eq!(h.sign.script_starts()[0], DisplayCode::Drums);
}
