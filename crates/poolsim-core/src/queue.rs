//! Storage for pending events.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::event::{Event, EventId};

/// Once the revocation set reaches this size and outnumbers live entries,
/// the queue is rebuilt instead of skipping tombstones one by one.
const COMPACTION_THRESHOLD: usize = 64;

/// An event with its firing rank: earlier due times fire first, and events
/// due at the same instant fire in scheduling order.
struct RankedEvent(Event);

impl PartialEq for RankedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for RankedEvent {}

impl Ord for RankedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .time
            .total_cmp(&other.0.time)
            .then_with(|| self.0.id.cmp(&other.0.id))
    }
}

impl PartialOrd for RankedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The pending-event queue.
///
/// Revocation is lazy: a revoked identifier goes into a tombstone set and
/// the entry is discarded when it surfaces at the head (or in bulk, once
/// the tombstones outnumber the queue).
pub(crate) struct EventQueue {
    pending: BinaryHeap<Reverse<RankedEvent>>,
    revoked: HashSet<EventId>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            pending: BinaryHeap::new(),
            revoked: HashSet::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.pending.push(Reverse(RankedEvent(event)));
    }

    /// Discards revoked entries sitting at the head of the queue.
    fn prune_head(&mut self) {
        while let Some(Reverse(head)) = self.pending.peek() {
            if self.revoked.remove(&head.0.id) {
                self.pending.pop();
            } else {
                break;
            }
        }
    }

    /// Removes and returns the earliest live event.
    pub fn pop_due(&mut self) -> Option<Event> {
        self.prune_head();
        self.pending.pop().map(|Reverse(ranked)| ranked.0)
    }

    /// Due time of the earliest live event, if any.
    pub fn next_due_time(&mut self) -> Option<f64> {
        self.prune_head();
        self.pending.peek().map(|Reverse(head)| head.0.time)
    }

    /// Marks an event as revoked. Unknown or already-delivered identifiers
    /// are ignored.
    pub fn revoke(&mut self, id: EventId) {
        self.revoked.insert(id);
        if self.revoked.len() > COMPACTION_THRESHOLD && self.revoked.len() * 2 > self.pending.len() {
            self.compact();
        }
    }

    /// Drops every pending event matching the predicate.
    pub fn revoke_where<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        let entries = std::mem::take(&mut self.pending);
        self.pending = entries
            .into_iter()
            .filter(|Reverse(ranked)| !pred(&ranked.0))
            .collect();
    }

    fn compact(&mut self) {
        let entries = std::mem::take(&mut self.pending);
        let revoked = std::mem::take(&mut self.revoked);
        self.pending = entries
            .into_iter()
            .filter(|Reverse(ranked)| !revoked.contains(&ranked.0.id))
            .collect();
    }

    /// Pushes everything due before `time` back to fire exactly at `time`,
    /// keeping relative order through the identifier tiebreak.
    pub fn defer_until(&mut self, time: f64) {
        let mut deferred = Vec::new();
        while let Some(Reverse(head)) = self.pending.peek() {
            if head.0.time >= time {
                break;
            }
            if let Some(Reverse(mut entry)) = self.pending.pop() {
                entry.0.time = time;
                deferred.push(entry);
            }
        }
        for entry in deferred {
            self.pending.push(Reverse(entry));
        }
    }
}
