//! Controller adapter against a mocked controller HTTP API.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aloxi_bridge::config::ControllerConfig;
use aloxi_bridge::controller::{ControllerAdapter, ControllerClient, ControllerCommand};
use aloxi_bridge::events::{EventBus, ModelEvent, StateEvent};
use aloxi_bridge::runtime::SupervisionPolicy;
use aloxi_core::error::AloxiError;

use common::home_document;

fn controller_config(server: &MockServer) -> ControllerConfig {
    common::config(&server.uri()).controller
}

fn spawn_adapter(cfg: &ControllerConfig, events: EventBus) -> ControllerAdapter {
    let client = ControllerClient::new(cfg).unwrap();
    let (adapter, _) =
        ControllerAdapter::spawn(client, cfg.ignore_rules(), events, 16, SupervisionPolicy::default());
    adapter
}

async fn mount_document(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(status).set_body_json(home_document()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn valid_switches_survive_a_broken_entry() {
    let server = MockServer::start().await;
    mount_document(&server, 200).await;
    let events = EventBus::new();
    let mut observed = events.subscribe();
    let adapter = spawn_adapter(&controller_config(&server), events);

    let home = adapter.load_model().await.unwrap();
    assert_eq!(home.len(), 3);
    assert_eq!(home.revision(), 1);
    assert_eq!(home.find("a-ceiling").unwrap().display_name, "Kitchen Ceiling");
    assert!(home.find("c-broken").is_none());
    assert_eq!(adapter.model().len(), 3);

    match tokio::time::timeout(Duration::from_secs(1), observed.recv()).await.unwrap().unwrap() {
        StateEvent::Model(ModelEvent::Refreshed {
            devices,
            skipped,
            revision,
            ..
        }) => {
            assert_eq!((devices, skipped, revision), (3, 1, 1));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn failed_fetch_keeps_the_previous_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(home_document()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let events = EventBus::new();
    let adapter = spawn_adapter(&controller_config(&server), events.clone());
    let before = adapter.load_model().await.unwrap();

    let mut observed = events.subscribe();
    let err = adapter.load_model().await.unwrap_err();
    assert!(matches!(err, AloxiError::Fetch { status: 503 }));
    assert_eq!(err.code().as_str(), "FETCH_FAILED");

    let after = adapter.model();
    assert_eq!(after.len(), 3);
    assert_eq!(after.revision(), before.revision());

    let event = tokio::time::timeout(Duration::from_secs(1), observed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, StateEvent::Model(ModelEvent::RefreshFailed { .. })));
}

#[tokio::test]
async fn unreachable_controller_leaves_an_empty_model() {
    // nothing listens on the discard port
    let cfg = common::config("http://127.0.0.1:9").controller;
    let adapter = spawn_adapter(&cfg, EventBus::new());

    let err = adapter.load_model().await.unwrap_err();
    assert_eq!(err.code().as_str(), "CONTROLLER");
    assert!(adapter.model().is_empty());
}

#[tokio::test]
async fn ignored_category_wins_over_supported_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cats": { "c-sec": { "name": "Security" }, "c-light": { "name": "Lighting" } },
            "controls": {
                "a-alarm": { "name": "Alarm Light", "type": "Switch", "uuidAction": "a-alarm", "cat": "c-sec" },
                "b-door":  { "name": "Door Opener", "type": "Switch", "uuidAction": "b-door", "cat": "c-light" },
                "c-floor": { "name": "Floor Lamp", "type": "Switch", "uuidAction": "c-floor", "cat": "c-light" },
                "d-blind": { "name": "Blinds", "type": "Jalousie", "uuidAction": "d-blind", "cat": "c-light" }
            }
        })))
        .mount(&server)
        .await;

    let mut cfg = controller_config(&server);
    cfg.ignore.categories = vec!["Security".into()];
    cfg.ignore.controls = vec!["Door Opener".into()];
    let adapter = spawn_adapter(&cfg, EventBus::new());

    let home = adapter.load_model().await.unwrap();
    let ids: Vec<&str> = home.devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["c-floor"]);
}

#[tokio::test]
async fn readers_keep_their_snapshot_across_a_reload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(home_document()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "controls": {
                "z-only": { "name": "Only", "type": "Switch", "uuidAction": "z-only" }
            }
        })))
        .mount(&server)
        .await;

    let adapter = spawn_adapter(&controller_config(&server), EventBus::new());
    adapter.load_model().await.unwrap();
    let held = adapter.model();

    let fresh = adapter.load_model().await.unwrap();
    assert_eq!(held.len(), 3);
    assert_eq!(held.revision(), 1);
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh.revision(), 2);
    assert_eq!(adapter.model().revision(), 2);
}

#[tokio::test]
async fn execute_hits_the_command_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dev/sps/io/a-ceiling/On"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "LL": { "Code": "200" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dev/sps/io/b-counter/Off"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = spawn_adapter(&controller_config(&server), EventBus::new());
    adapter.execute("a-ceiling", ControllerCommand::On).await.unwrap();

    let err = adapter.execute("b-counter", ControllerCommand::Off).await.unwrap_err();
    assert!(matches!(err, AloxiError::Fetch { status: 500 }));
}

#[tokio::test]
async fn credentials_are_sent_as_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(home_document()))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = controller_config(&server);
    cfg.username = Some("admin".into());
    cfg.password = Some("secret".into());
    let adapter = spawn_adapter(&cfg, EventBus::new());

    assert_eq!(adapter.load_model().await.unwrap().len(), 3);
}

#[tokio::test]
async fn periodic_refresh_reconciles_again() {
    let server = MockServer::start().await;
    mount_document(&server, 200).await;
    let adapter = spawn_adapter(&controller_config(&server), EventBus::new());
    adapter.load_model().await.unwrap();

    let ticker = adapter.spawn_refresh(Duration::from_millis(20));
    tokio::time::timeout(Duration::from_secs(2), async {
        while adapter.model().revision() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ticker did not reconcile");
    ticker.abort();
}
