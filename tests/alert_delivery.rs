use std::sync::Arc;
use std::time::Duration;

use alerthub::{
    alerts::{
        AlertEvent, AlertHub, AlertTarget, LocalEventBus, MembershipListener, MemoryQueue,
        QueueBridge, QueueMessage, RoleAssignments, StaticRoleDirectory,
    },
    config::{MembershipConfig, WebSocketConfig, WebserverConfig},
    hub::{Connection, ConnectionSettings, Envelope, Hub, OutboundQueue},
    webserver::{self, AppState},
};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_util::sync::CancellationToken;

struct Harness {
    hub: Arc<Hub>,
    directory: Arc<StaticRoleDirectory>,
    bus: Arc<LocalEventBus>,
    queue: Arc<MemoryQueue>,
    alerts: Arc<AlertHub>,
}

impl Harness {
    fn new() -> Self {
        let hub = Hub::new();
        let directory = StaticRoleDirectory::new();
        let bus = LocalEventBus::new();
        let queue = MemoryQueue::new();
        let alerts = Arc::new(AlertHub::new(Arc::clone(&hub), directory.clone()));
        MembershipListener::new(Arc::clone(&alerts), MembershipConfig::default())
            .register(bus.as_ref());
        Self {
            hub,
            directory,
            bus,
            queue,
            alerts,
        }
    }

    async fn connect(&self, identity: &str) -> (Arc<Connection>, OutboundQueue) {
        let (conn, queue) = Connection::new(identity, ConnectionSettings::default());
        self.alerts.register_connection(&conn, identity).await.unwrap();
        conn.activate();
        (conn, queue)
    }

    fn assignments(&self) -> RoleAssignments {
        RoleAssignments::new(
            Arc::clone(&self.directory),
            Arc::clone(&self.bus),
            MembershipConfig::default(),
        )
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn role_broadcast_reaches_registered_connection() {
    let harness = Harness::new();
    harness.directory.grant("u1", "admin");
    let (conn, mut queue) = harness.connect("u1").await;

    assert_eq!(conn.keys(), vec!["identity:u1", "role:admin"]);

    let message = Envelope::alert(serde_json::json!({"title": "Invoice overdue"}));
    assert_eq!(harness.hub.broadcast_to_key("role:admin", message.clone()), 1);

    let received = queue.drain();
    assert_eq!(received.len(), 1);
    assert_eq!(*received[0], message);
}

#[tokio::test]
async fn revocation_migrates_every_connection_of_identity() {
    let harness = Harness::new();
    harness.directory.grant("u1", "admin");
    let (laptop, _q1) = harness.connect("u1").await;
    let (phone, _q2) = harness.connect("u1").await;

    assert!(harness.assignments().revoke("u1", "admin").await.unwrap());

    for conn in [&laptop, &phone] {
        assert_eq!(conn.keys(), vec!["identity:u1"]);
    }
    assert_eq!(harness.hub.connections_for_key("identity:u1"), 2);
    assert_eq!(harness.hub.connections_for_key("role:admin"), 0);
    assert!(!harness.hub.snapshot().keys.contains_key("role:admin"));
    assert!(harness.hub.snapshot().is_consistent());
}

#[tokio::test]
async fn queued_alert_reaches_only_the_addressed_role() {
    let harness = Harness::new();
    harness.directory.grant("sup1", "supervisor");
    harness.directory.grant("sup2", "supervisor");
    harness.directory.grant("clerk", "clerk");

    let (_s1, mut sup1) = harness.connect("sup1").await;
    let (_s2, mut sup2) = harness.connect("sup2").await;
    let (_c, mut clerk) = harness.connect("clerk").await;

    let cancel = CancellationToken::new();
    let bridge = QueueBridge::new(Arc::clone(&harness.alerts), harness.queue.clone(), "alerts")
        .start()
        .await
        .unwrap();
    let bridge_task = tokio::spawn(bridge.run(cancel.clone()));

    let event = AlertEvent::new(
        AlertTarget::Role {
            id: "supervisor".to_string(),
        },
        serde_json::json!({"title": "Stock below minimum", "sku": "A-1"}),
    );
    harness
        .queue
        .publish(QueueMessage::json("alerts", &event).unwrap())
        .unwrap();

    for queue in [&mut sup1, &mut sup2] {
        let envelope = tokio::time::timeout(Duration::from_secs(2), queue.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.kind, "alert");
        assert_eq!(envelope.payload["sku"], "A-1");
    }

    cancel.cancel();
    bridge_task.await.unwrap();

    assert!(clerk.drain().is_empty());
    assert!(sup1.drain().is_empty());
    assert!(!harness.queue.has_consumer("alerts"));
}

#[tokio::test]
async fn broadcast_all_counts_multi_key_connections_once() {
    let harness = Harness::new();
    harness.directory.grant("u1", "admin");
    harness.directory.grant("u1", "supervisor");
    let (_a, mut qa) = harness.connect("u1").await;
    let (_b, mut qb) = harness.connect("u2").await;

    assert_eq!(harness.alerts.broadcast_to_all(Envelope::alert(serde_json::json!({}))), 2);
    assert_eq!(qa.drain().len(), 1);
    assert_eq!(qb.drain().len(), 1);
}

#[tokio::test]
async fn websocket_session_end_to_end() {
    let harness = Harness::new();
    harness.directory.grant("u1", "supervisor");

    let mut config = WebserverConfig::default();
    config.port = 0;
    config.trust_identity_header = true;
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        Arc::clone(&harness.alerts),
        config,
        &WebSocketConfig::default(),
        shutdown.clone(),
    ));

    let listener = webserver::bind(&state).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(webserver::serve(listener, Arc::clone(&state)));

    // Unlisted origin is refused before the upgrade
    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "http://evil.example".parse().unwrap());
    request.headers_mut().insert("X-Identity-Id", "u1".parse().unwrap());
    match tokio_tungstenite::connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 403),
        other => panic!("expected 403, got {:?}", other.map(|(_, response)| response.status())),
    }

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "http://localhost:3000".parse().unwrap());
    request.headers_mut().insert("X-Identity-Id", "u1".parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    let hub = Arc::clone(&harness.hub);
    wait_until(|| hub.connections_for_key("role:supervisor") == 1).await;

    assert_eq!(
        harness
            .alerts
            .broadcast_to_role("supervisor", Envelope::alert(serde_json::json!({"n": 7}))),
        1
    );
    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let envelope = Envelope::from_json(frame.to_text().unwrap()).unwrap();
    assert_eq!(envelope.kind, "alert");
    assert_eq!(envelope.payload["n"], 7);

    // Application heartbeat
    socket
        .send(tungstenite::Message::Text(r#"{"type":"ping"}"#.to_string()))
        .await
        .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(Envelope::from_json(frame.to_text().unwrap()).unwrap().kind, "pong");

    socket.close(None).await.unwrap();
    wait_until(|| hub.active_connection_count() == 0).await;
    assert!(hub.snapshot().keys.is_empty());

    shutdown.cancel();
    server.await.unwrap().unwrap();
}
