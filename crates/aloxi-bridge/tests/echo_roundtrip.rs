//! Echo correlation over the in-process bus.
//!
//! The test plays the far side of the channel: it reads the bridge's
//! `echoRequest` from the outbound topic and injects responses inbound.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use aloxi_bridge::events::EventBus;
use aloxi_bridge::runtime::SupervisionPolicy;
use aloxi_bridge::services::{EchoOutcome, EchoProcessor};
use aloxi_bridge::transport::{LocalBus, TransportManager};
use aloxi_core::error::AloxiError;
use aloxi_core::protocol::ops;

use common::{frame, next_envelope, INBOUND, OUTBOUND};

const DEADLINE: Duration = Duration::from_secs(2);

async fn setup() -> (LocalBus, EchoProcessor) {
    let bus = LocalBus::new();
    let cfg = common::config("http://controller.test").transport;
    let (transport, _) = TransportManager::spawn(
        cfg,
        Arc::new(bus.clone()),
        EventBus::new(),
        32,
        SupervisionPolicy::default(),
    );
    transport.connect().await.unwrap();

    let (echo, _) = EchoProcessor::spawn(transport.clone(), 32, SupervisionPolicy::default());
    transport.register_handler(ops::ECHO_RESPONSE, echo.handler());
    transport.register_handler(ops::ECHO_REQUEST, echo.handler());
    (bus, echo)
}

fn respond(bus: &LocalBus, token: &Value) {
    bus.inject(INBOUND, frame(ops::ECHO_RESPONSE, token.clone()));
}

async fn pending_settles_to(echo: &EchoProcessor, expected: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while echo.pending().await.unwrap() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending count did not settle");
}

#[tokio::test]
async fn same_token_matches() {
    let (bus, echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    let call = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });

    let req = next_envelope(&mut tap).await;
    assert_eq!(req.operation, ops::ECHO_REQUEST);
    respond(&bus, &req.data);

    match call.await.unwrap().unwrap() {
        EchoOutcome::Match { token, .. } => assert_eq!(json!(token), req.data),
        other => panic!("expected match, got {other:?}"),
    }
    assert_eq!(echo.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn different_token_is_a_mismatch() {
    let (bus, echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    let call = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });

    let req = next_envelope(&mut tap).await;
    respond(&bus, &json!("someone-else"));

    let outcome = call.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        EchoOutcome::Mismatch {
            expected: req.data.as_str().unwrap().to_string(),
            received: "someone-else".into(),
        }
    );
    assert!(!outcome.is_match());
}

#[tokio::test]
async fn duplicate_response_is_a_noop() {
    let (bus, echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    let first = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let req = next_envelope(&mut tap).await;
    respond(&bus, &req.data);
    respond(&bus, &req.data);
    assert!(first.await.unwrap().unwrap().is_match());

    // the redelivery must not be taken as a mismatch for the next echo
    let second = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let req2 = next_envelope(&mut tap).await;
    assert_ne!(req.data, req2.data);
    respond(&bus, &req2.data);
    assert!(second.await.unwrap().unwrap().is_match());
}

#[tokio::test]
async fn silence_times_out_and_late_response_is_discarded() {
    let (bus, echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    let err = echo.send_echo(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, AloxiError::Timeout));
    assert_eq!(err.code().as_str(), "TIMEOUT");
    pending_settles_to(&echo, 0).await;

    let late = next_envelope(&mut tap).await;
    respond(&bus, &late.data);

    let call = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let req = next_envelope(&mut tap).await;
    respond(&bus, &req.data);
    assert!(call.await.unwrap().unwrap().is_match());
}

#[tokio::test]
async fn concurrent_echoes_resolve_independently() {
    let (bus, echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    let a = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let b = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });

    let first = next_envelope(&mut tap).await;
    let second = next_envelope(&mut tap).await;
    pending_settles_to(&echo, 2).await;

    // answer in reverse order
    respond(&bus, &second.data);
    respond(&bus, &first.data);

    assert!(a.await.unwrap().unwrap().is_match());
    assert!(b.await.unwrap().unwrap().is_match());
    assert_eq!(echo.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn answers_echo_requests_from_the_far_side() {
    let (bus, _echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    bus.inject(INBOUND, frame(ops::ECHO_REQUEST, json!({ "nonce": 7 })));

    let reply = next_envelope(&mut tap).await;
    assert_eq!(reply.operation, ops::ECHO_RESPONSE);
    assert_eq!(reply.data, json!({ "nonce": 7 }));
}

#[tokio::test]
async fn cancelled_caller_does_not_absorb_a_mismatch() {
    let (bus, echo) = setup().await;
    let mut tap = bus.tap(OUTBOUND);

    let cancelled = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let dead = next_envelope(&mut tap).await;
    cancelled.abort();
    assert!(cancelled.await.unwrap_err().is_cancelled());
    pending_settles_to(&echo, 0).await;

    let live = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let req = next_envelope(&mut tap).await;
    respond(&bus, &json!("foreign-token"));

    assert_eq!(
        live.await.unwrap().unwrap(),
        EchoOutcome::Mismatch {
            expected: req.data.as_str().unwrap().to_string(),
            received: "foreign-token".into(),
        }
    );

    // the dropped caller's token is retired, not a fresh mismatch source
    let after = tokio::spawn({
        let echo = echo.clone();
        async move { echo.send_echo(DEADLINE).await }
    });
    let req = next_envelope(&mut tap).await;
    respond(&bus, &dead.data);
    respond(&bus, &req.data);
    assert!(after.await.unwrap().unwrap().is_match());
}
