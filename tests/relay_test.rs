// In-process tests for the relay core: connections are driven directly
// through RelayServer and their outbound queues stand in for sockets.

use prompter_relay::config::{OverflowPolicy, RelayConfig};
use prompter_relay::core::{
    Connection, DiscardReason, DispatchOutcome, RelayServer,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn next_json(conn: &Connection) -> Value {
    let frame = timeout(Duration::from_secs(1), conn.next_outbound())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed");
    serde_json::from_str(frame.to_str().expect("text frame")).expect("valid JSON")
}

async fn next_raw(conn: &Connection) -> String {
    let frame = timeout(Duration::from_secs(1), conn.next_outbound())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed");
    frame.to_str().expect("text frame").to_string()
}

// Join and swallow every presence update the join produced
async fn join_all(server: &RelayServer, channel: &str, count: usize) -> Vec<Arc<Connection>> {
    let mut members: Vec<Arc<Connection>> = Vec::new();
    for _ in 0..count {
        let conn = server.new_connection();
        server.connect(&conn, channel).await.unwrap();
        members.push(conn);
        for member in &members {
            let update = next_json(member).await;
            assert_eq!(update["type"], "connection_update");
        }
    }
    members
}

#[tokio::test]
async fn test_controller_text_reaches_teleprompter() {
    let server = RelayServer::new(RelayConfig::default());
    let x = server.new_connection();
    let y = server.new_connection();

    server.connect(&x, "room-ab12cd").await.unwrap();
    assert_eq!(next_json(&x).await["connection_count"], 1);
    server.handle_text(&x, r#"{"type":"mode","mode":"controller"}"#.to_string()).await;

    server.connect(&y, "room-ab12cd").await.unwrap();
    assert_eq!(next_json(&x).await["connection_count"], 2);
    assert_eq!(next_json(&y).await["connection_count"], 2);
    server.handle_text(&y, r#"{"type":"mode","mode":"teleprompter"}"#.to_string()).await;
    assert_eq!(next_json(&x).await["mode"], "teleprompter");

    server.handle_text(&x, r#"{"type":"text","text":"Hello"}"#.to_string()).await;
    assert_eq!(next_raw(&y).await, r#"{"type":"text","text":"Hello"}"#);
    assert_eq!(x.pending_outbound(), 0);
}

#[tokio::test]
async fn test_lone_member_broadcast_goes_nowhere() {
    let server = RelayServer::new(RelayConfig::default());
    let x = join_all(&server, "room-1", 1).await.remove(0);
    let bystander = join_all(&server, "room-other", 1).await.remove(0);

    let outcome = server.handle_text(&x, r#"{"type":"start"}"#.to_string()).await;
    assert!(matches!(outcome, DispatchOutcome::Relayed { recipients: 0, .. }));
    assert_eq!(x.pending_outbound(), 0);
    assert_eq!(bystander.pending_outbound(), 0);
}

#[tokio::test]
async fn test_departure_updates_remaining_member() {
    let server = RelayServer::new(RelayConfig::default());
    let members = join_all(&server, "room-2", 2).await;
    let (x, y) = (&members[0], &members[1]);

    server.disconnect(y).await;
    let update = next_json(x).await;
    assert_eq!(update["type"], "connection_update");
    assert_eq!(update["connection_count"], 1);
}

#[tokio::test]
async fn test_malformed_frame_does_not_break_connection() {
    let server = RelayServer::new(RelayConfig::default());
    let members = join_all(&server, "room-3", 2).await;
    let (x, y) = (&members[0], &members[1]);

    let outcome = server.handle_text(x, "{{{ definitely not json".to_string()).await;
    assert!(matches!(outcome, DispatchOutcome::Discarded(DiscardReason::Malformed(_))));
    assert!(x.is_open());

    server.handle_text(x, r#"{"type":"pause"}"#.to_string()).await;
    assert_eq!(next_raw(y).await, r#"{"type":"pause"}"#);
}

#[tokio::test]
async fn test_presence_counts_on_each_join() {
    let server = RelayServer::new(RelayConfig::default());
    let existing = join_all(&server, "studio", 3).await;

    let newcomer = server.new_connection();
    server.connect(&newcomer, "studio").await.unwrap();
    for member in existing.iter().chain(std::iter::once(&newcomer)) {
        let update = next_json(member).await;
        assert_eq!(update["connection_count"], 4);
    }
}

#[tokio::test]
async fn test_member_count_tracks_net_joins() {
    let server = RelayServer::new(RelayConfig::default());
    let members = join_all(&server, "room", 5).await;

    server.disconnect(&members[0]).await;
    server.disconnect(&members[0]).await;
    server.disconnect(&members[3]).await;
    assert_eq!(server.registry().member_count("room").await, 3);

    for member in &members {
        server.disconnect(member).await;
    }
    assert_eq!(server.registry().member_count("room").await, 0);
    assert_eq!(server.registry().channel_count().await, 0);
}

#[tokio::test]
async fn test_channel_isolation() {
    let server = RelayServer::new(RelayConfig::default());
    let bar = join_all(&server, "bar", 2).await;

    let foo = join_all(&server, "foo", 2).await;
    server.handle_text(&foo[0], r#"{"type":"reset"}"#.to_string()).await;
    assert_eq!(next_raw(&foo[1]).await, r#"{"type":"reset"}"#);
    for member in &foo {
        server.disconnect(member).await;
    }

    assert_eq!(server.registry().member_count("bar").await, 2);
    assert_eq!(bar[0].pending_outbound(), 0);
    assert_eq!(bar[1].pending_outbound(), 0);
}

#[tokio::test]
async fn test_order_preserved_per_sender() {
    let server = RelayServer::new(RelayConfig::default());
    let members = join_all(&server, "room", 2).await;

    for value in 1..=10 {
        server
            .handle_text(&members[0], format!(r#"{{"type":"speed","value":{}}}"#, value))
            .await;
    }
    for value in 1..=10 {
        assert_eq!(next_json(&members[1]).await["value"], value);
    }
}

#[tokio::test]
async fn test_slow_member_disconnected_on_overflow() {
    let config = RelayConfig {
        queue_capacity: 3,
        overflow_policy: OverflowPolicy::Disconnect,
        ..RelayConfig::default()
    };
    let server = RelayServer::new(config);
    let members = join_all(&server, "room", 2).await;
    let (fast, slow) = (&members[0], &members[1]);

    for _ in 0..4 {
        server.handle_text(fast, r#"{"type":"fastforward"}"#.to_string()).await;
    }
    assert!(slow.is_closed());
    assert!(fast.is_open());

    server.disconnect(slow).await;
    assert_eq!(next_json(fast).await["connection_count"], 1);
}

#[tokio::test]
async fn test_overflowed_member_drops_out_of_counts_immediately() {
    let config = RelayConfig {
        queue_capacity: 3,
        overflow_policy: OverflowPolicy::Disconnect,
        ..RelayConfig::default()
    };
    let server = RelayServer::new(config);
    let members = join_all(&server, "room", 2).await;
    let (fast, slow) = (&members[0], &members[1]);

    for _ in 0..4 {
        server.handle_text(fast, r#"{"type":"fastforward"}"#.to_string()).await;
    }
    assert!(slow.is_closed());

    // Nobody has called disconnect for the slow member yet
    assert_eq!(server.registry().member_count("room").await, 1);
    assert_eq!(server.channel_info("room").await.connection_count, 1);
    assert_eq!(server.health().await.active_connections, 1);

    let outcome = server
        .handle_text(fast, r#"{"type":"request_connection_info"}"#.to_string())
        .await;
    assert!(matches!(outcome, DispatchOutcome::PresenceSent { recipients: 1, .. }));
    assert_eq!(next_json(fast).await["connection_count"], 1);

    let outcome = server.handle_text(fast, r#"{"type":"start"}"#.to_string()).await;
    assert!(matches!(outcome, DispatchOutcome::Relayed { recipients: 0, .. }));
}

#[tokio::test]
async fn test_slow_member_lags_under_drop_oldest() {
    let config = RelayConfig {
        queue_capacity: 2,
        overflow_policy: OverflowPolicy::DropOldest,
        ..RelayConfig::default()
    };
    let server = RelayServer::new(config);
    let members = join_all(&server, "room", 2).await;

    for value in 1..=5 {
        server
            .handle_text(&members[0], format!(r#"{{"type":"width","value":{}}}"#, value * 10))
            .await;
    }
    assert!(members[1].is_open());
    assert_eq!(next_json(&members[1]).await["value"], 40);
    assert_eq!(next_json(&members[1]).await["value"], 50);
}

#[tokio::test]
async fn test_join_message_switches_channel() {
    let server = RelayServer::new(RelayConfig::default());
    let lobby = join_all(&server, "lobby", 2).await;

    let outcome = server
        .handle_text(&lobby[0], r#"{"type":"join","channel":"stage"}"#.to_string())
        .await;
    assert!(matches!(outcome, DispatchOutcome::Moved { member_count: 1, .. }));
    assert_eq!(next_json(&lobby[1]).await["connection_count"], 1);
    assert_eq!(next_json(&lobby[0]).await["connection_count"], 1);

    // No longer hears lobby traffic
    server.handle_text(&lobby[1], r#"{"type":"start"}"#.to_string()).await;
    assert_eq!(lobby[0].pending_outbound(), 0);
}
