//! Bounded outbound queue between the relay and one socket writer
//!
//! Producers never wait: a push either lands, evicts the oldest frame, or
//! reports overflow, depending on the policy. A single writer task drains
//! the queue with `pop`.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use warp::ws::Message;

use crate::config::OverflowPolicy;

/// Result of offering a frame to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Frame queued after evicting the oldest pending one
    DroppedOldest,
    /// Queue full under the disconnect policy; frame not queued
    Overflow,
    Closed,
}

struct QueueState {
    frames: VecDeque<Message>,
    closed: bool,
}

pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            policy,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A panic while holding this lock leaves the deque intact
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, frame: Message) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            if state.frames.len() < self.capacity {
                state.frames.push_back(frame);
                PushOutcome::Queued
            } else {
                match self.policy {
                    OverflowPolicy::Disconnect => return PushOutcome::Overflow,
                    OverflowPolicy::DropOldest => {
                        state.frames.pop_front();
                        state.frames.push_back(frame);
                        PushOutcome::DroppedOldest
                    }
                }
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next frame. Returns `None` once the queue is closed;
    /// frames still pending at close time are discarded.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue; idempotent
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.frames.clear();
        }
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn text(frame: &Message) -> &str {
        frame.to_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = OutboundQueue::new(8, OverflowPolicy::Disconnect);
        for i in 0..3 {
            assert_eq!(queue.push(Message::text(format!("m{}", i))), PushOutcome::Queued);
        }
        assert_eq!(queue.len(), 3);

        for i in 0..3 {
            let frame = queue.pop().await.unwrap();
            assert_eq!(text(&frame), format!("m{}", i));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_policy_reports_overflow() {
        let queue = OutboundQueue::new(2, OverflowPolicy::Disconnect);
        assert_eq!(queue.push(Message::text("a")), PushOutcome::Queued);
        assert_eq!(queue.push(Message::text("b")), PushOutcome::Queued);
        assert_eq!(queue.push(Message::text("c")), PushOutcome::Overflow);
        assert_eq!(queue.len(), 2);
        assert_eq!(text(&queue.pop().await.unwrap()), "a");
    }

    #[tokio::test]
    async fn test_drop_oldest_policy_keeps_newest() {
        let queue = OutboundQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(Message::text("a"));
        queue.push(Message::text("b"));
        assert_eq!(queue.push(Message::text("c")), PushOutcome::DroppedOldest);

        assert_eq!(text(&queue.pop().await.unwrap()), "b");
        assert_eq!(text(&queue.pop().await.unwrap()), "c");
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_writer() {
        let queue = Arc::new(OutboundQueue::new(4, OverflowPolicy::Disconnect));
        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let popped = timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();
        assert!(popped.is_none());
        assert_eq!(queue.push(Message::text("late")), PushOutcome::Closed);
    }

    #[tokio::test]
    async fn test_push_wakes_waiting_writer() {
        let queue = Arc::new(OutboundQueue::new(4, OverflowPolicy::Disconnect));
        let writer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(Message::text("wake"));

        let popped = timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();
        assert_eq!(text(&popped.unwrap()), "wake");
    }
}
