//! Skill requests translated into controller commands.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aloxi_bridge::controller::{ControllerAdapter, ControllerClient};
use aloxi_bridge::events::EventBus;
use aloxi_bridge::runtime::SupervisionPolicy;
use aloxi_bridge::services::SkillAdapter;
use aloxi_bridge::transport::{LocalBus, TransportManager};
use aloxi_core::error::AloxiError;
use aloxi_core::protocol::ops;
use aloxi_core::skill::SkillRequest;

use common::{frame, home_document, next_envelope, INBOUND, OUTBOUND};

async fn controller(server: &MockServer) -> ControllerAdapter {
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(home_document()))
        .mount(server)
        .await;

    let cfg = common::config(&server.uri()).controller;
    let (adapter, _) = ControllerAdapter::spawn(
        ControllerClient::new(&cfg).unwrap(),
        cfg.ignore_rules(),
        EventBus::new(),
        16,
        SupervisionPolicy::default(),
    );
    adapter.load_model().await.unwrap();
    adapter
}

async fn expect_command(server: &MockServer, id: &str, command: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/dev/sps/io/{id}/{command}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

async fn skill(server: &MockServer) -> SkillAdapter {
    let (skill, _) = SkillAdapter::spawn(controller(server).await, None, 16, SupervisionPolicy::default());
    skill
}

#[tokio::test]
async fn unknown_request_name_gets_an_empty_object() {
    let server = MockServer::start().await;
    let skill = skill(&server).await;

    let resp = skill
        .handle_request(SkillRequest::new("FooRequest").for_appliance("a-ceiling"))
        .await
        .unwrap();
    assert!(resp.is_empty());
    assert_eq!(resp.into_value(), json!({}));
}

#[tokio::test]
async fn unimplemented_skill_requests_get_an_empty_object() {
    let server = MockServer::start().await;
    let skill = skill(&server).await;

    for name in [
        "DiscoverAppliancesRequest",
        "IncrementPercentageRequest",
        "DecrementPercentageRequest",
    ] {
        let resp = skill.handle_request(SkillRequest::new(name)).await.unwrap();
        assert!(resp.is_empty(), "{name}");
    }
}

#[tokio::test]
async fn turn_on_and_off_drive_the_switch() {
    let server = MockServer::start().await;
    let skill = skill(&server).await;
    expect_command(&server, "a-ceiling", "On").await;
    expect_command(&server, "d-hall", "Off").await;

    let on = skill
        .handle_request(SkillRequest::new("TurnOnRequest").for_appliance("a-ceiling"))
        .await
        .unwrap();
    assert_eq!(on.name(), Some("TurnOnConfirmation"));

    let off = skill
        .handle_request(SkillRequest::new("TurnOffRequest").for_appliance("d-hall"))
        .await
        .unwrap();
    assert_eq!(off.name(), Some("TurnOffConfirmation"));
}

#[tokio::test]
async fn percentage_switches_on_above_zero() {
    let server = MockServer::start().await;
    let skill = skill(&server).await;
    expect_command(&server, "a-ceiling", "On").await;
    expect_command(&server, "b-counter", "Off").await;

    let dim = skill
        .handle_request(
            SkillRequest::new("SetPercentageRequest")
                .for_appliance("a-ceiling")
                .with_percentage(40.0),
        )
        .await
        .unwrap();
    assert_eq!(dim.name(), Some("SetPercentageConfirmation"));

    skill
        .handle_request(
            SkillRequest::new("SetPercentageRequest")
                .for_appliance("b-counter")
                .with_percentage(0.0),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn bad_percentage_is_rejected_before_any_command() {
    let server = MockServer::start().await;
    let skill = skill(&server).await;

    let missing = skill
        .handle_request(SkillRequest::new("SetPercentageRequest").for_appliance("a-ceiling"))
        .await
        .unwrap_err();
    assert!(matches!(missing, AloxiError::BadRequest(_)));

    let too_big = skill
        .handle_request(
            SkillRequest::new("SetPercentageRequest")
                .for_appliance("a-ceiling")
                .with_percentage(140.0),
        )
        .await
        .unwrap_err();
    assert!(matches!(too_big, AloxiError::BadRequest(_)));

    let commands = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().starts_with("/dev/"))
        .count();
    assert_eq!(commands, 0);
}

#[tokio::test]
async fn unknown_or_skipped_appliance_is_not_found() {
    let server = MockServer::start().await;
    let skill = skill(&server).await;

    for id in ["nope", "c-broken"] {
        let err = skill
            .handle_request(SkillRequest::new("TurnOnRequest").for_appliance(id))
            .await
            .unwrap_err();
        assert_eq!(err.code().as_str(), "NOT_FOUND", "{id}");
    }

    let err = skill
        .handle_request(SkillRequest::new("TurnOnRequest"))
        .await
        .unwrap_err();
    assert!(matches!(err, AloxiError::NotFound(_)));
}

async fn bus_skill(server: &MockServer) -> LocalBus {
    let bus = LocalBus::new();
    let cfg = common::config(&server.uri()).transport;
    let (transport, _) = TransportManager::spawn(
        cfg,
        Arc::new(bus.clone()),
        EventBus::new(),
        16,
        SupervisionPolicy::default(),
    );
    transport.connect().await.unwrap();

    let (skill, _) = SkillAdapter::spawn(
        controller(server).await,
        Some(transport.clone()),
        16,
        SupervisionPolicy::default(),
    );
    transport.register_handler(ops::SKILL_REQUEST, skill.handler());
    bus
}

#[tokio::test]
async fn bus_request_is_answered_with_a_skill_response() {
    let server = MockServer::start().await;
    expect_command(&server, "b-counter", "Off").await;
    let bus = bus_skill(&server).await;
    let mut tap = bus.tap(OUTBOUND);

    bus.inject(
        INBOUND,
        frame(
            ops::SKILL_REQUEST,
            json!({ "name": "TurnOffRequest", "messageId": "m-1", "applianceId": "b-counter" }),
        ),
    );

    let reply = next_envelope(&mut tap).await;
    assert_eq!(reply.operation, ops::SKILL_RESPONSE);
    assert_eq!(
        reply.data,
        json!({ "messageId": "m-1", "response": { "name": "TurnOffConfirmation" } })
    );
}

#[tokio::test]
async fn bus_failure_is_answered_with_a_fault_code() {
    let server = MockServer::start().await;
    let bus = bus_skill(&server).await;
    let mut tap = bus.tap(OUTBOUND);

    bus.inject(
        INBOUND,
        frame(
            ops::SKILL_REQUEST,
            json!({ "name": "TurnOnRequest", "messageId": "m-2", "applianceId": "ghost" }),
        ),
    );
    let reply = next_envelope(&mut tap).await;
    assert_eq!(reply.data["messageId"], json!("m-2"));
    assert_eq!(reply.data["error"]["code"], json!("NOT_FOUND"));

    bus.inject(INBOUND, frame(ops::SKILL_REQUEST, json!({ "messageId": "m-3" })));
    let reply = next_envelope(&mut tap).await;
    assert_eq!(reply.data["messageId"], json!("m-3"));
    assert_eq!(reply.data["error"]["code"], json!("BAD_REQUEST"));
}
