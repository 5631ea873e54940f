//! Per-publish acknowledgement tracking.

use crate::traits::AckSink;
use crate::types::NodeId;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Identifier for an in-flight publish.
pub type PublishId = u64;

/// Terminal result of a tracked publish.
///
/// Resolved exactly once, either when every expected node has acknowledged
/// or when the deadline elapses. Partial failure is never retried here;
/// the caller decides whether a partial publish is acceptable.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Every expected node acknowledged before the deadline.
    FullyAcknowledged,
    /// The deadline elapsed with some, but not all, acknowledgements.
    PartiallyAcknowledged {
        acknowledged: Vec<NodeId>,
        missing: Vec<NodeId>,
    },
    /// The deadline elapsed with zero acknowledgements.
    Unacknowledged { expected: Vec<NodeId> },
}

impl PublishOutcome {
    pub fn is_fully_acknowledged(&self) -> bool {
        matches!(self, PublishOutcome::FullyAcknowledged)
    }
}

#[derive(Debug)]
struct EntryState {
    acknowledged: HashSet<NodeId>,
    outcome: Option<PublishOutcome>,
}

#[derive(Debug)]
struct AckEntry {
    expected: HashSet<NodeId>,
    deadline: Instant,
    state: Mutex<EntryState>,
    cond: Condvar,
}

impl AckEntry {
    /// Record one acknowledgement. Returns true when the entry just resolved.
    fn acknowledge(&self, node: &NodeId) -> bool {
        // acknowledged ⊆ expected: acks from nodes outside the policy set
        // (late joiners, stale deliveries) are dropped
        if !self.expected.contains(node) {
            tracing::trace!(node = %node, "ignoring ack from node outside the expected set");
            return false;
        }
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            return false;
        }
        // A delivery after the deadline resolves the entry with what had
        // actually arrived by then; the late ack itself is never counted.
        if Instant::now() >= self.deadline {
            let outcome = self.expire(&state.acknowledged);
            state.outcome = Some(outcome);
            self.cond.notify_all();
            return true;
        }
        state.acknowledged.insert(node.clone());
        if state.acknowledged.len() == self.expected.len() {
            state.outcome = Some(PublishOutcome::FullyAcknowledged);
            self.cond.notify_all();
            return true;
        }
        false
    }

    fn wait(&self) -> PublishOutcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            let now = Instant::now();
            if now >= self.deadline {
                let outcome = self.expire(&state.acknowledged);
                state.outcome = Some(outcome.clone());
                self.cond.notify_all();
                return outcome;
            }
            self.cond.wait_for(&mut state, self.deadline - now);
        }
    }

    fn expire(&self, acknowledged: &HashSet<NodeId>) -> PublishOutcome {
        if acknowledged.is_empty() {
            PublishOutcome::Unacknowledged {
                expected: sorted(&self.expected),
            }
        } else {
            PublishOutcome::PartiallyAcknowledged {
                acknowledged: sorted(acknowledged),
                missing: sorted(&(&self.expected - acknowledged)),
            }
        }
    }
}

fn sorted(nodes: &HashSet<NodeId>) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = nodes.iter().cloned().collect();
    out.sort();
    out
}

/// Tracks acknowledgements for in-flight publishes.
///
/// Entries are mutated by concurrent membership delivery threads and
/// finalized by at most one waiting thread; each entry carries its own
/// mutex + condvar so a slow publish never stalls another.
#[derive(Debug, Clone, Default)]
pub struct AckTracker {
    entries: Arc<DashMap<PublishId, Arc<AckEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry for a publish expecting acks from `expected` within
    /// `timeout`. An empty expected set resolves immediately.
    pub fn track(&self, expected: HashSet<NodeId>, timeout: Duration) -> PublishReceipt {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resolved_immediately = expected.is_empty();
        let entry = Arc::new(AckEntry {
            expected,
            deadline: Instant::now() + timeout,
            state: Mutex::new(EntryState {
                acknowledged: HashSet::new(),
                outcome: if resolved_immediately {
                    Some(PublishOutcome::FullyAcknowledged)
                } else {
                    None
                },
            }),
            cond: Condvar::new(),
        });
        if !resolved_immediately {
            self.entries.insert(id, Arc::clone(&entry));
        }
        PublishReceipt {
            id,
            entry,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Record an acknowledgement from `node` for publish `id`.
    ///
    /// Unknown ids (already resolved publishes) and nodes outside the
    /// expected set are ignored.
    pub fn acknowledge(&self, id: PublishId, node: &NodeId) {
        let resolved = match self.entries.get(&id) {
            Some(entry) => entry.acknowledge(node),
            None => return,
        };
        if resolved {
            self.entries.remove(&id);
        }
    }

    /// An `AckSink` that routes membership-level acks into entry `id`.
    pub fn sink_for(&self, id: PublishId) -> Arc<dyn AckSink> {
        Arc::new(TrackerSink {
            tracker: self.clone(),
            id,
        })
    }

    /// Number of unresolved entries, for introspection and tests.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }
}

struct TrackerSink {
    tracker: AckTracker,
    id: PublishId,
}

impl AckSink for TrackerSink {
    fn node_acked(&self, node: &NodeId) {
        self.tracker.acknowledge(self.id, node);
    }
}

/// Caller-side handle for one tracked publish.
#[derive(Debug)]
pub struct PublishReceipt {
    id: PublishId,
    entry: Arc<AckEntry>,
    entries: Arc<DashMap<PublishId, Arc<AckEntry>>>,
}

impl PublishReceipt {
    pub fn publish_id(&self) -> PublishId {
        self.id
    }

    /// Block until the publish resolves, at the latest when its deadline
    /// elapses. Subsequent calls return the same outcome.
    pub fn wait(&self) -> PublishOutcome {
        let outcome = self.entry.wait();
        self.entries.remove(&self.id);
        outcome
    }
}

// Entries live exactly as long as a caller can still observe them: a
// receipt dropped without waiting (e.g. on a failed transport send) must
// not leave its entry behind.
impl Drop for PublishReceipt {
    fn drop(&mut self) {
        self.entries.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn nodes(ids: &[&str]) -> HashSet<NodeId> {
        ids.iter().map(|id| NodeId::from(*id)).collect()
    }

    #[test]
    fn test_full_acknowledgement_resolves_before_deadline() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a", "b", "c"]), Duration::from_secs(30));

        tracker.acknowledge(receipt.publish_id(), &NodeId::from("c"));
        tracker.acknowledge(receipt.publish_id(), &NodeId::from("a"));
        tracker.acknowledge(receipt.publish_id(), &NodeId::from("b"));

        let start = Instant::now();
        assert_eq!(receipt.wait(), PublishOutcome::FullyAcknowledged);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_partial_acknowledgement_at_deadline() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a", "b", "c"]), Duration::from_millis(50));

        tracker.acknowledge(receipt.publish_id(), &NodeId::from("a"));
        tracker.acknowledge(receipt.publish_id(), &NodeId::from("b"));

        match receipt.wait() {
            PublishOutcome::PartiallyAcknowledged {
                acknowledged,
                missing,
            } => {
                assert_eq!(acknowledged, vec![NodeId::from("a"), NodeId::from("b")]);
                assert_eq!(missing, vec![NodeId::from("c")]);
            }
            other => panic!("expected partial acknowledgement, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_acknowledgements_at_deadline() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a", "b"]), Duration::from_millis(30));

        match receipt.wait() {
            PublishOutcome::Unacknowledged { expected } => {
                assert_eq!(expected, vec![NodeId::from("a"), NodeId::from("b")]);
            }
            other => panic!("expected unacknowledged, got {other:?}"),
        }
    }

    #[test]
    fn test_ack_from_unexpected_node_is_ignored() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a"]), Duration::from_millis(50));

        tracker.acknowledge(receipt.publish_id(), &NodeId::from("stranger"));

        match receipt.wait() {
            PublishOutcome::Unacknowledged { expected } => {
                assert_eq!(expected, vec![NodeId::from("a")]);
            }
            other => panic!("expected unacknowledged, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_expected_set_resolves_immediately() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(HashSet::new(), Duration::from_secs(30));
        assert_eq!(receipt.wait(), PublishOutcome::FullyAcknowledged);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_ack_after_deadline_is_not_counted() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a"]), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(60));

        tracker.acknowledge(receipt.publish_id(), &NodeId::from("a"));

        match receipt.wait() {
            PublishOutcome::Unacknowledged { expected } => {
                assert_eq!(expected, vec![NodeId::from("a")]);
            }
            other => panic!("expected unacknowledged, got {other:?}"),
        }
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_late_ack_resolves_with_what_arrived_in_time() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a", "b"]), Duration::from_millis(20));
        tracker.acknowledge(receipt.publish_id(), &NodeId::from("a"));
        thread::sleep(Duration::from_millis(60));

        tracker.acknowledge(receipt.publish_id(), &NodeId::from("b"));

        match receipt.wait() {
            PublishOutcome::PartiallyAcknowledged {
                acknowledged,
                missing,
            } => {
                assert_eq!(acknowledged, vec![NodeId::from("a")]);
                assert_eq!(missing, vec![NodeId::from("b")]);
            }
            other => panic!("expected partial acknowledgement, got {other:?}"),
        }
    }

    #[test]
    fn test_dropped_receipt_releases_its_entry() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a"]), Duration::from_secs(30));
        assert_eq!(tracker.in_flight(), 1);
        drop(receipt);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_outcome_is_stable_across_waits() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a"]), Duration::from_millis(20));
        let first = receipt.wait();
        // late ack after resolution must not change the outcome
        tracker.acknowledge(receipt.publish_id(), &NodeId::from("a"));
        assert_eq!(receipt.wait(), first);
    }

    #[test]
    fn test_concurrent_acks_resolve_once() {
        let tracker = AckTracker::new();
        let expected: HashSet<NodeId> =
            (0..16).map(|i| NodeId::from(format!("n{i}"))).collect();
        let receipt = tracker.track(expected.clone(), Duration::from_secs(30));

        let mut handles = vec![];
        for node in expected {
            let tracker = tracker.clone();
            let id = receipt.publish_id();
            handles.push(thread::spawn(move || {
                tracker.acknowledge(id, &node);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(receipt.wait(), PublishOutcome::FullyAcknowledged);
    }

    #[test]
    fn test_sink_routes_into_tracker() {
        let tracker = AckTracker::new();
        let receipt = tracker.track(nodes(&["a"]), Duration::from_secs(10));
        let sink = tracker.sink_for(receipt.publish_id());
        sink.node_acked(&NodeId::from("a"));
        assert_eq!(receipt.wait(), PublishOutcome::FullyAcknowledged);
    }

    #[test]
    fn test_independent_publishes_do_not_interfere() {
        let tracker = AckTracker::new();
        let first = tracker.track(nodes(&["a"]), Duration::from_secs(10));
        let second = tracker.track(nodes(&["a", "b"]), Duration::from_millis(40));

        tracker.acknowledge(first.publish_id(), &NodeId::from("a"));
        tracker.acknowledge(second.publish_id(), &NodeId::from("b"));

        assert_eq!(first.wait(), PublishOutcome::FullyAcknowledged);
        match second.wait() {
            PublishOutcome::PartiallyAcknowledged { acknowledged, .. } => {
                assert_eq!(acknowledged, vec![NodeId::from("b")]);
            }
            other => panic!("expected partial acknowledgement, got {other:?}"),
        }
    }
}
