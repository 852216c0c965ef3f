// SPDX-License-Identifier: MIT

//! Log hub: fans a single process's stdout/stderr out to zero-or-more
//! live subscribers without ever blocking the publisher.
//!
//! The publisher (the supervisor's stdio pump tasks) holds the hub's lock
//! only long enough to push into the tail buffer and into each
//! subscriber's own bounded queue — never across an `.await`. A slow
//! subscriber's queue fills up and further lines are folded into a
//! single trailing [`LogEvent::Gap`] that doesn't itself count against
//! the queue's capacity, so it always has room to land ahead of the next
//! line the subscriber does read, however long it stayed behind.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

outpost_core::define_id! {
    /// Identifies one live subscriber of a process's log hub.
    pub struct SubscriberId("sub-");
}

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

outpost_core::simple_display! {
    Channel {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// One item delivered to a subscriber: either a line, or a marker telling
/// the subscriber it missed some number of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Line { channel: Channel, line: String },
    Gap { dropped: u64 },
}

impl LogEvent {
    pub fn line(channel: Channel, line: impl Into<String>) -> Self {
        Self::Line { channel, line: line.into() }
    }
}

struct Subscriber {
    queue: VecDeque<LogEvent>,
    capacity: usize,
    notify: Arc<Notify>,
}

struct State {
    tail: VecDeque<LogEvent>,
    tail_capacity: usize,
    subscribers: HashMap<SubscriberId, Subscriber>,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
    queue_capacity: usize,
}

/// Per-process fan-out log hub. Cheap to clone (reference-counted).
#[derive(Clone)]
pub struct LogHub(Arc<Shared>);

impl LogHub {
    /// `tail_capacity` of 0 disables history replay on attach.
    pub fn new(tail_capacity: usize, queue_capacity: usize) -> Self {
        Self(Arc::new(Shared {
            state: Mutex::new(State {
                tail: VecDeque::with_capacity(tail_capacity.min(1024)),
                tail_capacity,
                subscribers: HashMap::new(),
                closed: false,
            }),
            queue_capacity,
        }))
    }

    /// Publish one line read from the child's stdout/stderr. Never blocks:
    /// a full subscriber queue drops the line for that subscriber only.
    pub fn publish(&self, channel: Channel, line: impl Into<String>) {
        let event = LogEvent::line(channel, line);
        let mut state = self.0.state.lock();
        if state.closed {
            return;
        }

        if state.tail_capacity > 0 {
            if state.tail.len() == state.tail_capacity {
                state.tail.pop_front();
            }
            state.tail.push_back(event.clone());
        }

        for sub in state.subscribers.values_mut() {
            deliver(sub, event.clone());
        }
    }

    /// Register a new subscriber. If the hub was built with a non-zero
    /// tail capacity, the handle is seeded with the buffered history
    /// before any new lines — a late attacher sees recent context
    /// instead of only lines published after it connected.
    pub fn subscribe(&self) -> LogHandle {
        let id = SubscriberId::new();
        let notify = Arc::new(Notify::new());
        let mut state = self.0.state.lock();

        let mut sub =
            Subscriber { queue: VecDeque::new(), capacity: self.0.queue_capacity.max(1), notify: notify.clone() };
        for event in state.tail.iter().cloned() {
            deliver(&mut sub, event);
        }

        if !state.closed {
            state.subscribers.insert(id, sub);
        }
        // If the hub is already closed, `sub` is simply dropped here: the
        // handle's own `next()` sees `closed` and returns `None` right away.

        LogHandle { id, hub: self.0.clone(), notify }
    }

    /// Called by the supervisor once the child can produce no further
    /// output (descriptor is being deleted). Subscribers keep draining
    /// whatever is already queued; once drained, their `next()` returns
    /// `None`. Subscribers stay registered until their handle is dropped,
    /// so already-buffered events survive the close.
    pub fn close(&self) {
        let mut state = self.0.state.lock();
        state.closed = true;
        for sub in state.subscribers.values() {
            sub.notify.notify_one();
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.0.state.lock().subscribers.len()
    }
}

/// Push `event` into `sub`'s queue, respecting capacity. Only `Line`
/// entries count against capacity — once the queue is full, further
/// lines are folded into a single trailing `Gap` that keeps growing
/// until the subscriber catches up and reads past it.
fn deliver(sub: &mut Subscriber, event: LogEvent) {
    let real_count = sub.queue.iter().filter(|e| matches!(e, LogEvent::Line { .. })).count();
    if real_count >= sub.capacity {
        match sub.queue.back_mut() {
            Some(LogEvent::Gap { dropped }) => *dropped += 1,
            _ => sub.queue.push_back(LogEvent::Gap { dropped: 1 }),
        }
    } else {
        sub.queue.push_back(event);
    }
    sub.notify.notify_one();
}

/// A live subscriber's receiving end. Dropping it unregisters the
/// subscriber from the hub.
pub struct LogHandle {
    id: SubscriberId,
    hub: Arc<Shared>,
    notify: Arc<Notify>,
}

impl LogHandle {
    pub async fn next(&mut self) -> Option<LogEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.hub.state.lock();
                match state.subscribers.get_mut(&self.id) {
                    Some(sub) => {
                        if let Some(event) = sub.queue.pop_front() {
                            return Some(event);
                        }
                        if state.closed {
                            return None;
                        }
                    }
                    None => return None,
                }
            }
            notified.await;
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        self.hub.state.lock().subscribers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_lines_in_publish_order() {
        let hub = LogHub::new(256, 16);
        let mut handle = hub.subscribe();
        hub.publish(Channel::Stdout, "one");
        hub.publish(Channel::Stdout, "two");

        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "one")));
        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "two")));
    }

    #[tokio::test]
    async fn late_subscriber_replays_tail_buffer() {
        let hub = LogHub::new(256, 16);
        hub.publish(Channel::Stdout, "before attach");
        let mut handle = hub.subscribe();
        hub.publish(Channel::Stdout, "after attach");

        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "before attach")));
        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "after attach")));
    }

    #[tokio::test]
    async fn tail_buffer_evicts_oldest_beyond_capacity() {
        let hub = LogHub::new(2, 16);
        hub.publish(Channel::Stdout, "a");
        hub.publish(Channel::Stdout, "b");
        hub.publish(Channel::Stdout, "c");
        let mut handle = hub.subscribe();

        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "b")));
        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "c")));
    }

    #[tokio::test]
    async fn zero_tail_capacity_disables_replay() {
        let hub = LogHub::new(0, 16);
        hub.publish(Channel::Stdout, "missed");
        let mut handle = hub.subscribe();
        hub.publish(Channel::Stdout, "seen");

        assert_eq!(handle.next().await, Some(LogEvent::line(Channel::Stdout, "seen")));
    }

    #[tokio::test]
    async fn slow_subscriber_gets_gap_marker_but_never_blocks_publisher() {
        let hub = LogHub::new(256, 2);
        let mut handle = hub.subscribe();

        // Fill the subscriber's queue (capacity 2) without reading.
        for i in 0..10 {
            hub.publish(Channel::Stdout, format!("line {i}"));
        }

        // The publisher never blocked above; now drain and expect the
        // first two lines followed by a gap marker covering the rest.
        let first = handle.next().await.unwrap();
        let second = handle.next().await.unwrap();
        assert_eq!(first, LogEvent::line(Channel::Stdout, "line 0"));
        assert_eq!(second, LogEvent::line(Channel::Stdout, "line 1"));

        let third = handle.next().await.unwrap();
        assert!(matches!(third, LogEvent::Gap { dropped } if dropped > 0));
    }

    #[tokio::test]
    async fn other_subscribers_unaffected_by_one_slow_subscriber() {
        let hub = LogHub::new(256, 1);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for i in 0..5 {
            hub.publish(Channel::Stdout, format!("{i}"));
            // fast drains immediately, slow never does until the end.
            assert!(fast.next().await.is_some());
        }
        drop(slow.next().await); // drain exactly one item from `slow`, rest were dropped
        drop(fast);
    }

    #[tokio::test]
    async fn close_flushes_queued_items_then_ends_stream() {
        let hub = LogHub::new(256, 16);
        let mut handle = hub.subscribe();
        hub.publish(Channel::Stdout, "queued before close");
        hub.close();

        assert_eq!(
            handle.next().await,
            Some(LogEvent::line(Channel::Stdout, "queued before close"))
        );
        assert_eq!(handle.next().await, None);
    }

    #[tokio::test]
    async fn gap_marker_is_delivered_even_when_reader_is_already_waiting() {
        let hub = LogHub::new(256, 1);
        let mut handle = hub.subscribe();

        let reader = tokio::spawn(async move {
            let mut events = Vec::new();
            for _ in 0..2 {
                events.push(handle.next().await.unwrap());
            }
            events
        });

        tokio::task::yield_now().await;
        for i in 0..5 {
            hub.publish(Channel::Stdout, format!("line {i}"));
        }

        let events = reader.await.unwrap();
        assert_eq!(events[0], LogEvent::line(Channel::Stdout, "line 0"));
        assert!(matches!(events[1], LogEvent::Gap { dropped } if dropped > 0));
    }

    #[tokio::test]
    async fn dropping_handle_unregisters_subscriber() {
        let hub = LogHub::new(256, 16);
        let handle = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(handle);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_after_close_is_a_no_op() {
        let hub = LogHub::new(256, 16);
        hub.close();
        hub.publish(Channel::Stdout, "dropped silently");
        let mut handle = hub.subscribe();
        assert_eq!(handle.next().await, None);
    }
}
