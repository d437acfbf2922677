use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

use huddle::config::EngineConfig;
use huddle::engine::Engine;
use huddle::limits::MAX_LINE_LEN;
use huddle::store::InMemoryStore;
use huddle::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("huddle_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(InMemoryStore::open(&dir.join("huddle.wal")).unwrap());
    let engine = Arc::new(Engine::new(store, EngineConfig::default()));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    addr
}

struct Client {
    lines: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.unwrap();
        Self {
            lines: Framed::new(socket, LinesCodec::new()),
        }
    }

    async fn send_raw(&mut self, line: &str) -> Option<Value> {
        self.lines.send(line.to_string()).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), self.lines.next())
            .await
            .expect("no reply within 5s")?;
        Some(serde_json::from_str(&reply.unwrap()).unwrap())
    }

    async fn call(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string())
            .await
            .expect("connection closed")
    }

    async fn register(&mut self, name: &str, timezone: &str) -> String {
        let reply = self
            .call(json!({"op": "register_participant", "name": name, "timezone": timezone}))
            .await;
        assert_eq!(reply["ok"], true, "{reply}");
        reply["data"]["id"].as_str().unwrap().to_string()
    }
}

fn create(title: &str, start: &str, end: &str, ids: &[&str]) -> Value {
    json!({
        "op": "create_meeting",
        "title": title,
        "start": start,
        "end": end,
        "participant_ids": ids,
    })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle_over_tcp() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let ada = client.register("Ada", "Europe/Berlin").await;

    let created = client
        .call(create("Design review", "2024-01-01T10:00:00Z", "2024-01-01T11:00:00Z", &[&ada]))
        .await;
    assert_eq!(created["ok"], true, "{created}");
    let meeting_id = created["data"]["id"].as_str().unwrap().to_string();

    let fetched = client.call(json!({"op": "get_meeting", "id": meeting_id})).await;
    assert_eq!(fetched["data"]["title"], "Design review");

    let moved = client
        .call(json!({
            "op": "update_meeting",
            "id": meeting_id,
            "title": "Design review (moved)",
            "start": "2024-01-01T11:30:00+01:00",
            "end": "2024-01-01T12:30:00+01:00",
            "participant_ids": [ada],
        }))
        .await;
    assert_eq!(moved["ok"], true, "{moved}");
    assert_eq!(moved["data"]["slot"]["start"], "2024-01-01T10:30:00Z");

    let schedule = client
        .call(json!({"op": "participant_schedule", "participant_id": ada}))
        .await;
    let items = schedule["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["start"], "2024-01-01T11:30:00+01:00");

    let deleted = client.call(json!({"op": "delete_meeting", "id": meeting_id})).await;
    assert_eq!(deleted["ok"], true);
    let again = client.call(json!({"op": "delete_meeting", "id": meeting_id})).await;
    assert_eq!(again["error"]["code"], "NotFound");
}

#[tokio::test]
async fn conflict_reply_lists_alternatives() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let u1 = client.register("U1", "UTC").await;

    let first = client
        .call(create("Standup", "2024-01-01T10:00:00Z", "2024-01-01T11:00:00Z", &[&u1]))
        .await;
    assert_eq!(first["ok"], true);

    let clash = client
        .call(create("Clash", "2024-01-01T10:30:00Z", "2024-01-01T11:30:00Z", &[&u1]))
        .await;
    assert_eq!(clash["ok"], false);
    assert_eq!(clash["error"]["code"], "SchedulingConflict");
    let alternatives = clash["error"]["alternatives"].as_array().unwrap();
    assert_eq!(
        alternatives[0],
        json!({"start": "2024-01-01T11:00:00Z", "end": "2024-01-01T12:00:00Z"})
    );
}

#[tokio::test]
async fn validation_errors_use_taxonomy_codes() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let u1 = client.register("U1", "UTC").await;

    let empty = client
        .call(create("x", "2024-01-01T10:00:00Z", "2024-01-01T11:00:00Z", &[]))
        .await;
    assert_eq!(empty["error"]["code"], "NoParticipants");

    let zero = client
        .call(create("x", "2024-01-01T10:00:00Z", "2024-01-01T10:00:00Z", &[&u1]))
        .await;
    assert_eq!(zero["error"]["code"], "InvalidTimeRange");

    let tz = client
        .call(json!({"op": "register_participant", "name": "Bo", "timezone": "Nowhere/Land"}))
        .await;
    assert_eq!(tz["error"]["code"], "InvalidTimezone");
}

#[tokio::test]
async fn malformed_line_keeps_connection_open() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let bad = client.send_raw("{not json").await.unwrap();
    assert_eq!(bad["error"]["code"], "BadRequest");

    let page = client.call(json!({"op": "list_meetings", "page": 0, "page_size": 0})).await;
    assert_eq!(page["ok"], true);
    assert_eq!(page["data"]["page"], 1);
    assert_eq!(page["data"]["page_size"], 1);
    assert_eq!(page["data"]["total_count"], 0);
}

#[tokio::test]
async fn oversized_line_closes_connection() {
    let addr = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let huge = "x".repeat(MAX_LINE_LEN + 1);
    let _ = client.lines.send(huge).await;

    // At most one BadRequest reply, then the server hangs up.
    let mut closed = false;
    for _ in 0..2 {
        let next = tokio::time::timeout(Duration::from_secs(5), client.lines.next())
            .await
            .unwrap();
        match next {
            Some(Ok(line)) => {
                let reply: Value = serde_json::from_str(&line).unwrap();
                assert_eq!(reply["error"]["code"], "BadRequest");
            }
            None | Some(Err(_)) => {
                closed = true;
                break;
            }
        }
    }
    assert!(closed);
}

#[tokio::test]
async fn concurrent_clients_book_exactly_once() {
    let addr = start_test_server().await;
    let mut setup = Client::connect(addr).await;
    let u1 = setup.register("U1", "UTC").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let u1 = u1.clone();
        handles.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await;
            client
                .call(create("Race", "2024-01-01T10:00:00Z", "2024-01-01T11:00:00Z", &[&u1]))
                .await
        }));
    }

    let mut booked = 0;
    for h in handles {
        let reply = h.await.unwrap();
        if reply["ok"] == true {
            booked += 1;
        } else {
            assert_eq!(reply["error"]["code"], "SchedulingConflict");
        }
    }
    assert_eq!(booked, 1);
}
