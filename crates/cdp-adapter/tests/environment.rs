mod common;

use std::sync::Arc;

use cdp_adapter::{
    AdapterErrorKind, BrowserEnvironment, ClientConfig, CommandTarget, TransportEvent,
};
use common::*;
use serde_json::json;
use swtk_core_types::{TargetId, VersionId};

fn scripted_browser() -> (
    Arc<MockTransport>,
    tokio::sync::mpsc::UnboundedSender<TransportEvent>,
) {
    let (transport, events) = MockTransport::new();
    transport.respond(
        "Target.getTargets",
        json!({ "targetInfos": [
            { "targetId": "T-NEW", "type": "page", "url": "about:blank", "title": "" },
            { "targetId": "SW-1", "type": "service_worker", "url": "http://localhost:4000/sw.js" },
            { "targetId": "T-OLD", "type": "page", "url": "about:blank" }
        ]}),
    );
    transport.on("Target.attachToTarget", |params| {
        let target = params["targetId"].as_str().unwrap_or_default();
        json!({ "sessionId": format!("S-{target}") })
    });
    transport.respond("Target.createTarget", json!({ "targetId": "T-3" }));
    (transport, events)
}

#[tokio::test]
async fn start_attaches_and_activates_first_tab() {
    let (transport, _events) = scripted_browser();
    let env = Arc::new(BrowserEnvironment::new(
        transport.clone(),
        ClientConfig::default(),
    ));

    let client = env.start().await.expect("start");
    assert_eq!(client.target_id().as_str(), "T-NEW");
    assert_eq!(client.session_id(), "S-T-NEW");
    assert_eq!(
        env.active_client().expect("active").target_id().as_str(),
        "T-NEW"
    );

    let tabs = env.list_tabs().await.expect("tabs");
    assert_eq!(tabs.len(), 2);

    let activated = transport.wait_for_command("Target.activateTarget").await;
    assert_eq!(activated.params["targetId"], "T-NEW");
    assert!(transport
        .sent("ServiceWorker.enable")
        .iter()
        .any(|command| command.target == CommandTarget::Session("S-T-NEW".into())));

    env.shutdown().await;
}

#[tokio::test]
async fn notifications_route_by_session() {
    let (transport, events) = scripted_browser();
    let env = Arc::new(BrowserEnvironment::new(
        transport.clone(),
        ClientConfig::default(),
    ));
    let first = env.start().await.expect("start");
    let second = env.new_tab().await.expect("new tab");
    assert_eq!(second.target_id().as_str(), "T-3");

    events
        .send(versions(&[("7", "installed", "running")]).for_session("S-T-3"))
        .expect("send");

    eventually(|| second.tracker().version(&VersionId::from("7")).is_some()).await;
    assert!(first.tracker().versions().is_empty());

    env.shutdown().await;
}

#[tokio::test]
async fn tab_index_counts_from_oldest() {
    let (transport, _events) = scripted_browser();
    let env = Arc::new(BrowserEnvironment::new(
        transport.clone(),
        ClientConfig::default(),
    ));
    env.start().await.expect("start");

    let oldest = env
        .open_tab_by_index(0)
        .await
        .expect("open")
        .expect("in range");
    assert_eq!(oldest.target_id().as_str(), "T-OLD");
    assert_eq!(
        env.active_client().expect("active").target_id().as_str(),
        "T-OLD"
    );
    assert!(env.open_tab_by_index(5).await.expect("open").is_none());
    assert!(env.open_tab_by_index(usize::MAX).await.expect("open").is_none());

    let newest = env.open_last_tab().await.expect("open").expect("tab");
    assert_eq!(newest.target_id().as_str(), "T-NEW");

    env.shutdown().await;
}

#[tokio::test]
async fn open_and_activate_tab_switches_active_client() {
    let (transport, _events) = scripted_browser();
    let env = Arc::new(BrowserEnvironment::new(
        transport.clone(),
        ClientConfig::default(),
    ));
    env.start().await.expect("start");

    let active = env.open_and_activate_tab().await.expect("open and activate");
    // The scripted browser lists T-NEW as the newest tab.
    assert_eq!(active.target_id().as_str(), "T-NEW");
    assert!(env.client(&TargetId::from("T-3")).is_some());
    assert_eq!(transport.sent("Target.createTarget").len(), 1);

    env.shutdown().await;
}

#[tokio::test]
async fn detached_tabs_are_forgotten() {
    let (transport, events) = scripted_browser();
    let env = Arc::new(BrowserEnvironment::new(
        transport.clone(),
        ClientConfig::default(),
    ));
    env.start().await.expect("start");
    env.open_tab_by_id(&TargetId::from("T-OLD"))
        .await
        .expect("open");

    events
        .send(TransportEvent::new(
            "Target.detachedFromTarget",
            json!({ "sessionId": "S-T-OLD", "targetId": "T-OLD" }),
        ))
        .expect("send");

    eventually(|| env.client(&TargetId::from("T-OLD")).is_none()).await;
    assert!(env.active_client().is_err());
    assert!(env.client(&TargetId::from("T-NEW")).is_some());

    env.shutdown().await;
}

#[tokio::test]
async fn closed_event_stream_disconnects_environment() {
    let (transport, events) = scripted_browser();
    let env = Arc::new(BrowserEnvironment::new(
        transport.clone(),
        ClientConfig::default(),
    ));
    env.start().await.expect("start");
    assert!(!env.is_disconnected());
    let commands_before = transport.commands().len();

    drop(events);

    eventually(|| env.is_disconnected()).await;
    let err = env.active_client().unwrap_err();
    assert_eq!(err.kind, AdapterErrorKind::CdpIo);
    assert!(err.to_string().contains("connection closed"));
    assert_eq!(transport.commands().len(), commands_before);

    env.shutdown().await;
}
