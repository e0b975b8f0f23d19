//! WebSocket connection management
//! Handles the lifecycle of one client connection

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;
use warp::ws::Message;

use crate::config::OverflowPolicy;
use crate::core::outbound::{OutboundQueue, PushOutcome};

/// Unique identifier of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSED: u8 = 2;

/// Represents the state of a single WebSocket connection
pub struct Connection {
    pub id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    state: AtomicU8,
    outbound: OutboundQueue,
    closed_tx: watch::Sender<bool>,
    last_seen: Mutex<Instant>,
}

impl Connection {
    /// Create a connection in the `Connecting` state
    pub fn new(queue_capacity: usize, policy: OverflowPolicy) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            connected_at: Utc::now(),
            state: AtomicU8::new(CONNECTING),
            outbound: OutboundQueue::new(queue_capacity, policy),
            closed_tx,
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            CONNECTING => ConnectionState::Connecting,
            OPEN => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Move from `Connecting` to `Open`. Returns false if already closed.
    pub fn mark_open(&self) -> bool {
        match self
            .state
            .compare_exchange(CONNECTING, OPEN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == OPEN,
        }
    }

    /// Queue a frame for this client. Fire-and-forget: returns whether the
    /// frame was accepted, never an error.
    pub fn send(&self, frame: Message) -> bool {
        if !self.is_open() {
            debug!("Client {} not connected, dropping outbound frame", self.id);
            return false;
        }

        match self.outbound.push(frame) {
            PushOutcome::Queued => true,
            PushOutcome::DroppedOldest => {
                debug!("Outbound queue full for client {}, dropped oldest frame", self.id);
                true
            }
            PushOutcome::Overflow => {
                warn!(
                    "Outbound queue full for client {} ({} frames), disconnecting",
                    self.id,
                    self.outbound.capacity()
                );
                self.close();
                false
            }
            PushOutcome::Closed => false,
        }
    }

    /// Send a text message through this connection
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Message::text(text))
    }

    /// Close the connection. Idempotent: only the first call has an effect
    /// and returns true.
    pub fn close(&self) -> bool {
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous == CLOSED {
            return false;
        }
        self.outbound.close();
        self.closed_tx.send_replace(true);
        true
    }

    /// Resolves once the connection is closed
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so this cannot fail while we borrow it
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Next frame for the socket writer; `None` after close
    pub async fn next_outbound(&self) -> Option<Message> {
        self.outbound.pop().await
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Record inbound activity
    pub fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    /// Check if the connection has been silent for longer than `timeout`
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_seen
            .lock()
            .map(|last_seen| last_seen.elapsed() > timeout)
            .unwrap_or(false)
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn open_connection() -> Connection {
        let conn = Connection::new(4, OverflowPolicy::Disconnect);
        assert!(conn.mark_open());
        conn
    }

    #[tokio::test]
    async fn test_state_machine() {
        let conn = Connection::new(4, OverflowPolicy::Disconnect);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.mark_open());
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.mark_open());
        assert!(conn.close());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.mark_open());
    }

    #[tokio::test]
    async fn test_send_before_open_is_noop() {
        let conn = Connection::new(4, OverflowPolicy::Disconnect);
        assert!(!conn.send_text("early"));
        assert_eq!(conn.pending_outbound(), 0);
    }

    #[tokio::test]
    async fn test_send_after_close_is_noop() {
        let conn = open_connection();
        conn.close();
        assert!(!conn.send_text("late"));
        assert!(conn.next_outbound().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = open_connection();
        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.close());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_closed_resolves() {
        let conn = std::sync::Arc::new(open_connection());
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.close();
        assert!(timeout(Duration::from_secs(1), waiter).await.is_ok());

        // Already closed: resolves immediately
        assert!(timeout(Duration::from_millis(100), conn.closed()).await.is_ok());
    }

    #[tokio::test]
    async fn test_overflow_disconnects() {
        let conn = Connection::new(1, OverflowPolicy::Disconnect);
        conn.mark_open();
        assert!(conn.send_text("one"));
        assert!(!conn.send_text("two"));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_overflow_drop_oldest_stays_open() {
        let conn = Connection::new(1, OverflowPolicy::DropOldest);
        conn.mark_open();
        assert!(conn.send_text("one"));
        assert!(conn.send_text("two"));
        assert!(conn.is_open());
        let frame = conn.next_outbound().await.unwrap();
        assert_eq!(frame.to_str().unwrap(), "two");
    }

    #[test]
    fn test_idle_tracking() {
        let conn = open_connection();
        conn.touch();
        assert!(!conn.is_idle(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.is_idle(Duration::from_millis(5)));
    }
}
