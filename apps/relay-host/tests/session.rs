use std::sync::Arc;

use relay_bus::registry::{ProviderCatalog, providers};
use relay_bus::{Bus, BusConfig};
use relay_host::{EchoFacility, LineTransport, read_envelopes};
use serde_json::{Value, json};

async fn run_session(config: BusConfig, script: &[u8]) -> Vec<Value> {
    let mut catalog = ProviderCatalog::new();
    providers::register_all(&mut catalog, config.bus_id).unwrap();
    let transport = Arc::new(LineTransport::new(Vec::new()));
    let facility = Arc::new(EchoFacility::new(config.channel_prefix.clone()));
    let bus = Bus::new(&config, catalog, facility, transport.clone());

    let (sink, inbound) = futures::channel::mpsc::unbounded();
    read_envelopes(script, transport.clone(), sink)
        .await
        .unwrap();
    bus.run(inbound).await.unwrap();

    let written = Arc::into_inner(transport)
        .expect("bus released the transport")
        .into_inner();
    String::from_utf8(written)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn find<'a>(events: &'a [Value], tag: &str) -> Vec<&'a Value> {
    events.iter().filter(|event| event["tag"] == tag).collect()
}

#[tokio::test]
async fn scripted_session_produces_expected_events() {
    let script = r#"
{"tag":"create","payload":{"name":"storage","provider":"localstorage","options":{"seed":{"best":"7"}}}}
{"tag":"call","payload":{"id":1,"provider":"storage","method":"get","args":["stats"]}}
{"tag":"call","payload":{"id":"seeded","provider":"storage","method":"get","args":["best"]}}
{"tag":"call","payload":{"id":2,"provider":"missing","method":"x","args":[]}}
this is not json
{"tag":"createChannel"}
"#;
    let events = run_session(BusConfig::default(), script.as_bytes()).await;

    let errors = find(&events, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["payload"]["error"]["kind"], "InvalidAction");

    let returns = find(&events, "return");
    assert!(returns.contains(&&json!({"tag": "return", "payload": {"id": 1, "data": null}})));
    assert!(returns.contains(&&json!({"tag": "return", "payload": {"id": "seeded", "data": "7"}})));

    let failures = find(&events, "failure");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["payload"]["id"], 2);
    assert_eq!(failures[0]["payload"]["error"]["kind"], "UnknownProvider");

    assert_eq!(
        find(&events, "initChannel"),
        vec![&json!({"tag": "initChannel", "payload": "c1"})]
    );
}

#[tokio::test]
async fn core_can_be_left_out() {
    let config = BusConfig {
        seed_core: false,
        ..BusConfig::default()
    };
    let events = run_session(
        config,
        br#"{"tag":"call","payload":{"id":1,"provider":"core","method":"getId"}}"#,
    )
    .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["tag"], "failure");
    assert_eq!(events[0]["payload"]["error"]["kind"], "UnknownProvider");
}

#[tokio::test]
async fn undecodable_bytes_do_not_end_the_session() {
    let mut script = b"\xff\xfe garbage\n".to_vec();
    script.extend_from_slice(
        br#"{"tag":"call","payload":{"id":1.5,"provider":"core","method":"echo","args":["ok"]}}"#,
    );
    script.push(b'\n');

    let events = run_session(BusConfig::default(), &script).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["tag"], "error");
    assert_eq!(events[0]["payload"]["error"]["kind"], "InvalidAction");
    assert_eq!(
        events[1],
        json!({"tag": "return", "payload": {"id": 1.5, "data": "ok"}})
    );
}
