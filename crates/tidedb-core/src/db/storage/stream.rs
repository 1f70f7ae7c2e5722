//! Module: storage::stream
//! Responsibility: multicast delivery of event bulks with bounded buffers,
//! a short replay window, and an explicit terminal state.
//! Does not own: checkpoint derivation (the categorizer) or durable history
//! (`changed_documents_since` serves resumption past the replay window).
//! Boundary: one hub per collection state; instances publish after persisting.

use crate::{
    db::write::{Checkpoint, EventBulk},
    error::{ErrorClass, ErrorOrigin, InternalError},
};
use crossbeam_channel as xchan;
use parking_lot::Mutex;
use std::{cmp::Ordering, collections::VecDeque, time::Duration};

///
/// StreamEnd
///

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEnd {
    /// The owning instance closed.
    Completed,

    /// The subscriber fell behind and was disconnected. Resume with
    /// `changed_documents_since` from the carried checkpoint.
    Lagged { last_checkpoint: Option<Checkpoint> },
}

#[derive(Debug)]
enum StreamMessage {
    Bulk(EventBulk),
    End(StreamEnd),
}

///
/// ChangeStream
///
/// Receiving side of one subscription. Yields bulks in publish order and
/// then reports exactly one `StreamEnd`.
///

#[derive(Debug)]
pub struct ChangeStream {
    receiver: xchan::Receiver<StreamMessage>,
    end: Option<StreamEnd>,
    last_checkpoint: Option<Checkpoint>,
}

impl ChangeStream {
    fn ended(end: StreamEnd) -> Self {
        let (_, receiver) = xchan::bounded(0);
        Self {
            receiver,
            end: Some(end),
            last_checkpoint: None,
        }
    }

    /// Block until the next bulk; `None` once the stream has ended.
    pub fn recv(&mut self) -> Option<EventBulk> {
        if self.end.is_some() {
            return None;
        }
        let message = self.receiver.recv().ok();
        self.accept(message)
    }

    /// Next bulk if one is already buffered.
    pub fn try_recv(&mut self) -> Option<EventBulk> {
        if self.end.is_some() {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(message) => self.accept(Some(message)),
            Err(xchan::TryRecvError::Empty) => None,
            Err(xchan::TryRecvError::Disconnected) => self.accept(None),
        }
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<EventBulk> {
        if self.end.is_some() {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => self.accept(Some(message)),
            Err(xchan::RecvTimeoutError::Timeout) => None,
            Err(xchan::RecvTimeoutError::Disconnected) => self.accept(None),
        }
    }

    /// Terminal state, once reached.
    #[must_use]
    pub const fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    #[must_use]
    pub const fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.last_checkpoint.as_ref()
    }

    fn accept(&mut self, message: Option<StreamMessage>) -> Option<EventBulk> {
        match message {
            Some(StreamMessage::Bulk(bulk)) => {
                if let Some(checkpoint) = &bulk.checkpoint {
                    self.last_checkpoint = Some(checkpoint.clone());
                }
                Some(bulk)
            }
            Some(StreamMessage::End(end)) => {
                self.end = Some(end);
                None
            }
            // sender dropped without a terminal message: evicted for lag
            None => {
                self.end = Some(StreamEnd::Lagged {
                    last_checkpoint: self.last_checkpoint.clone(),
                });
                None
            }
        }
    }
}

impl Iterator for ChangeStream {
    type Item = EventBulk;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

///
/// Subscriber
///

#[derive(Debug)]
struct Subscriber {
    owner: u64,
    sender: xchan::Sender<StreamMessage>,
    capacity: usize,
}

impl Subscriber {
    // One slot past `capacity` stays reserved for the terminal message.
    fn offer(&self, bulk: &EventBulk) -> bool {
        self.sender.len() < self.capacity
            && self
                .sender
                .try_send(StreamMessage::Bulk(bulk.clone()))
                .is_ok()
    }

    fn complete(self) {
        let _ = self.sender.try_send(StreamMessage::End(StreamEnd::Completed));
    }
}

///
/// HubState
///

#[derive(Debug, Default)]
struct HubState {
    subscribers: Vec<Subscriber>,
    retained: VecDeque<EventBulk>,
    evicted_through: Option<Checkpoint>,
    completed: bool,
}

///
/// ChangeHub
///

#[derive(Debug)]
pub(crate) struct ChangeHub {
    state: Mutex<HubState>,
    capacity: usize,
    replay_capacity: usize,
}

impl ChangeHub {
    pub(crate) fn new(capacity: usize, replay_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            capacity: capacity.max(1),
            replay_capacity,
        }
    }

    /// Subscribe to bulks published from now on.
    pub(crate) fn subscribe(&self, owner: u64) -> ChangeStream {
        let mut state = self.state.lock();
        if state.completed {
            return ChangeStream::ended(StreamEnd::Completed);
        }

        self.register(&mut state, owner, Vec::new())
    }

    /// Subscribe, first replaying every retained bulk after `checkpoint`.
    pub(crate) fn subscribe_from(
        &self,
        owner: u64,
        checkpoint: &Checkpoint,
    ) -> Result<ChangeStream, InternalError> {
        let mut state = self.state.lock();
        if state.completed {
            return Ok(ChangeStream::ended(StreamEnd::Completed));
        }

        if let Some(evicted) = &state.evicted_through
            && evicted.cmp_position(checkpoint) == Ordering::Greater
        {
            return Err(InternalError::new(
                ErrorClass::Unsupported,
                ErrorOrigin::Storage,
                format!(
                    "replay gap: bulks after checkpoint ({}, {}) are no longer retained",
                    checkpoint.id, checkpoint.lwt
                ),
            ));
        }

        let backlog = state
            .retained
            .iter()
            .filter(|bulk| {
                bulk.checkpoint
                    .as_ref()
                    .is_some_and(|cp| cp.cmp_position(checkpoint) == Ordering::Greater)
            })
            .cloned()
            .collect::<Vec<_>>();

        Ok(self.register(&mut state, owner, backlog))
    }

    fn register(&self, state: &mut HubState, owner: u64, backlog: Vec<EventBulk>) -> ChangeStream {
        let capacity = self.capacity.max(backlog.len());
        let (sender, receiver) = xchan::bounded(capacity + 1);

        for bulk in backlog {
            let _ = sender.try_send(StreamMessage::Bulk(bulk));
        }

        state.subscribers.push(Subscriber {
            owner,
            sender,
            capacity,
        });

        ChangeStream {
            receiver,
            end: None,
            last_checkpoint: None,
        }
    }

    /// Deliver to every subscriber; a full subscriber is disconnected.
    pub(crate) fn publish(&self, bulk: &EventBulk) {
        let mut state = self.state.lock();
        if state.completed {
            return;
        }

        let before = state.subscribers.len();
        state.subscribers.retain(|subscriber| subscriber.offer(bulk));
        let lagged = before - state.subscribers.len();
        if lagged > 0 {
            tracing::warn!(lagged, "change stream subscribers disconnected for lag");
        }

        if self.replay_capacity > 0 {
            state.retained.push_back(bulk.clone());
            while state.retained.len() > self.replay_capacity {
                if let Some(evicted) = state.retained.pop_front() {
                    state.evicted_through = evicted.checkpoint.or(state.evicted_through.take());
                }
            }
        } else {
            state.evicted_through = bulk.checkpoint.clone().or(state.evicted_through.take());
        }
    }

    /// Complete the subscriptions opened through one instance.
    pub(crate) fn complete_owner(&self, owner: u64) {
        let mut state = self.state.lock();
        let (done, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut state.subscribers)
            .into_iter()
            .partition(|subscriber| subscriber.owner == owner);
        state.subscribers = keep;
        done.into_iter().for_each(Subscriber::complete);
    }

    /// Complete every subscription; later subscriptions end immediately.
    pub(crate) fn complete_all(&self) {
        let mut state = self.state.lock();
        state.completed = true;
        std::mem::take(&mut state.subscribers)
            .into_iter()
            .for_each(Subscriber::complete);
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(id: &str, lwt: f64) -> EventBulk {
        EventBulk {
            id: format!("bulk-{id}"),
            events: Vec::new(),
            checkpoint: Some(Checkpoint::new(id, lwt)),
            context: "test".to_string(),
        }
    }

    fn drain(stream: &mut ChangeStream) -> Vec<String> {
        std::iter::from_fn(|| stream.try_recv())
            .map(|bulk| bulk.id)
            .collect()
    }

    #[test]
    fn every_subscriber_sees_every_bulk_in_order() {
        let hub = ChangeHub::new(8, 8);
        let mut a = hub.subscribe(1);
        let mut b = hub.subscribe(2);

        hub.publish(&bulk("x", 1.0));
        hub.publish(&bulk("y", 2.0));

        assert_eq!(drain(&mut a), vec!["bulk-x", "bulk-y"]);
        assert_eq!(drain(&mut b), vec!["bulk-x", "bulk-y"]);
        assert_eq!(a.last_checkpoint(), Some(&Checkpoint::new("y", 2.0)));
    }

    #[test]
    fn completion_is_terminal_and_per_owner() {
        let hub = ChangeHub::new(8, 8);
        let mut mine = hub.subscribe(1);
        let mut other = hub.subscribe(2);

        hub.publish(&bulk("x", 1.0));
        hub.complete_owner(1);
        hub.publish(&bulk("y", 2.0));

        assert_eq!(mine.recv().map(|b| b.id), Some("bulk-x".to_string()));
        assert_eq!(mine.recv(), None);
        assert_eq!(mine.end(), Some(&StreamEnd::Completed));
        assert_eq!(drain(&mut other), vec!["bulk-x", "bulk-y"]);

        hub.complete_all();
        assert_eq!(other.recv(), None);
        assert_eq!(other.end(), Some(&StreamEnd::Completed));
        assert_eq!(hub.subscribe(3).end(), Some(&StreamEnd::Completed));
    }

    #[test]
    fn slow_subscribers_are_cut_off_with_their_checkpoint() {
        let hub = ChangeHub::new(2, 0);
        let mut slow = hub.subscribe(1);

        hub.publish(&bulk("a", 1.0));
        hub.publish(&bulk("b", 2.0));
        hub.publish(&bulk("c", 3.0));
        assert_eq!(hub.subscriber_count(), 0);

        assert_eq!(drain(&mut slow), vec!["bulk-a", "bulk-b"]);
        assert_eq!(
            slow.end(),
            Some(&StreamEnd::Lagged {
                last_checkpoint: Some(Checkpoint::new("b", 2.0)),
            })
        );
    }

    #[test]
    fn subscribe_from_replays_retained_bulks() {
        let hub = ChangeHub::new(4, 3);
        for (id, lwt) in [("a", 0.0), ("b", 1.0), ("c", 2.0)] {
            hub.publish(&bulk(id, lwt));
        }

        let mut stream = hub.subscribe_from(1, &Checkpoint::new("a", 0.0)).unwrap();
        hub.publish(&bulk("d", 3.0));

        assert_eq!(drain(&mut stream), vec!["bulk-b", "bulk-c", "bulk-d"]);
    }

    #[test]
    fn subscribe_from_reports_evicted_history() {
        let hub = ChangeHub::new(4, 2);
        hub.publish(&bulk("a", 1.0));
        hub.publish(&bulk("b", 2.0));
        hub.publish(&bulk("c", 3.0));

        let err = hub
            .subscribe_from(1, &Checkpoint::new("", 0.0))
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Unsupported);

        let mut stream = hub.subscribe_from(1, &Checkpoint::new("a", 1.0)).unwrap();
        assert_eq!(drain(&mut stream), vec!["bulk-b", "bulk-c"]);
    }
}
