//! # Sync State
//!
//! Group membership, owed deliveries, pending acknowledgements and the set
//! of messages already received. Mutated only through the methods below;
//! the node wraps it in a lock.
//!
//! A message is kept only while some peer is still owed it. The received
//! set remembers an id for twice the span a sender keeps retransmitting.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use shared_types::{GroupId, PublicKey};
use tracing::{debug, warn};

use super::entities::{Delivery, LogMessage, LogMessageId, PeerBatch, Payload};
use super::errors::DatasyncError;

/// Knobs the state machine needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncParams {
    /// Byte budget per batch.
    pub max_batch_bytes: usize,
    /// Backoff base in ticks.
    pub retransmission_base_epochs: u64,
    /// Give up after this many sends.
    pub max_send_attempts: u32,
}

#[derive(Debug, Default)]
struct Group {
    peers: BTreeSet<PublicKey>,
    messages: Vec<LogMessageId>,
}

/// In-memory replicated log state.
#[derive(Debug)]
pub struct SyncState {
    params: SyncParams,
    groups: HashMap<GroupId, Group>,
    messages: HashMap<LogMessageId, LogMessage>,
    outgoing: BTreeMap<PublicKey, Vec<Delivery>>,
    pending_acks: BTreeMap<PublicKey, Vec<LogMessageId>>,
    /// Received ids and the epoch each was first seen at.
    seen: HashMap<LogMessageId, u64>,
    epoch: u64,
}

impl SyncState {
    /// Empty state.
    pub fn new(params: SyncParams) -> Self {
        Self {
            params,
            groups: HashMap::new(),
            messages: HashMap::new(),
            outgoing: BTreeMap::new(),
            pending_acks: BTreeMap::new(),
            seen: HashMap::new(),
            epoch: 0,
        }
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Whether `peer` is a member of `group`.
    pub fn is_peer_in_group(&self, group: &GroupId, peer: &PublicKey) -> bool {
        self.groups
            .get(group)
            .is_some_and(|g| g.peers.contains(peer))
    }

    /// Add `peer` to `group`, creating the group on first use.
    ///
    /// A newly added peer is owed every message of the group that is still
    /// being delivered. Returns `false` if the peer was already a member.
    pub fn add_peer(&mut self, group: GroupId, peer: PublicKey) -> bool {
        let entry = self.groups.entry(group).or_default();
        if !entry.peers.insert(peer) {
            return false;
        }
        if !entry.messages.is_empty() {
            let owed = self.outgoing.entry(peer).or_default();
            owed.extend(entry.messages.iter().copied().map(Delivery::new));
        }
        true
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Append `message` to its group and schedule it for every member.
    ///
    /// Appending a message whose id already exists is a no-op that returns
    /// the same id.
    pub fn append(&mut self, message: LogMessage) -> Result<LogMessageId, DatasyncError> {
        let group = self
            .groups
            .get_mut(&message.group_id)
            .ok_or(DatasyncError::UnknownGroup(message.group_id))?;

        let id = message.id();
        if self.messages.contains_key(&id) {
            return Ok(id);
        }

        group.messages.push(id);
        for peer in &group.peers {
            self.outgoing.entry(*peer).or_default().push(Delivery::new(id));
        }
        self.messages.insert(id, message);
        Ok(id)
    }

    /// Collect everything due at `epoch` into per-peer batches.
    ///
    /// Each scheduled message has its attempt count bumped and its next
    /// retransmission pushed out exponentially. Messages that reached the
    /// attempt limit are dropped.
    pub fn flush(&mut self, epoch: u64) -> Vec<PeerBatch> {
        self.epoch = epoch;
        self.expire_seen();

        let peers: BTreeSet<PublicKey> = self
            .outgoing
            .keys()
            .chain(self.pending_acks.keys())
            .copied()
            .collect();

        let mut batches = Vec::new();
        for peer in peers {
            let due = self.take_due(&peer, epoch);
            let acks = self.pending_acks.remove(&peer).unwrap_or_default();
            batches.extend(self.pack(peer, acks, due));
        }
        batches
    }

    fn take_due(&mut self, peer: &PublicKey, epoch: u64) -> Vec<LogMessage> {
        let params = self.params;
        let Some(owed) = self.outgoing.get_mut(peer) else {
            return Vec::new();
        };

        let mut due = Vec::new();
        let mut given_up = Vec::new();
        owed.retain_mut(|delivery| {
            if delivery.next_epoch > epoch {
                return true;
            }
            if delivery.attempts >= params.max_send_attempts {
                warn!(
                    peer = %peer,
                    attempts = delivery.attempts,
                    "Giving up on unacknowledged message"
                );
                given_up.push(delivery.message_id);
                return false;
            }
            delivery.attempts += 1;
            delivery.next_epoch = epoch.saturating_add(backoff(
                params.retransmission_base_epochs,
                delivery.attempts,
            ));
            due.push(delivery.message_id);
            true
        });

        if owed.is_empty() {
            self.outgoing.remove(peer);
        }
        self.prune_settled(&given_up);

        due.iter()
            .filter_map(|id| self.messages.get(id).cloned())
            .collect()
    }

    fn pack(
        &self,
        peer: PublicKey,
        acks: Vec<LogMessageId>,
        messages: Vec<LogMessage>,
    ) -> Vec<PeerBatch> {
        let mut batches = Vec::new();
        let mut current = Payload {
            acks,
            messages: Vec::new(),
        };
        let mut used = 0usize;

        for message in messages {
            let cost = message.batch_cost();
            if !current.messages.is_empty() && used + cost > self.params.max_batch_bytes {
                batches.push(PeerBatch {
                    peer,
                    payload: std::mem::take(&mut current),
                });
                used = 0;
            }
            used += cost;
            current.messages.push(message);
        }

        if !current.is_empty() {
            batches.push(PeerBatch {
                peer,
                payload: current,
            });
        }
        batches
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply a payload received from `sender`.
    ///
    /// Acks clear owed deliveries. Every received message is acked back on
    /// the next flush, including duplicates. Returns the bodies of messages
    /// not seen before, in payload order.
    pub fn handle(&mut self, sender: PublicKey, payload: Payload) -> Vec<Vec<u8>> {
        if !payload.acks.is_empty() {
            if let Some(owed) = self.outgoing.get_mut(&sender) {
                owed.retain(|d| !payload.acks.contains(&d.message_id));
                if owed.is_empty() {
                    self.outgoing.remove(&sender);
                }
            }
            self.prune_settled(&payload.acks);
        }

        let mut fresh = Vec::new();
        for message in payload.messages {
            let id = message.id();
            let acks = self.pending_acks.entry(sender).or_default();
            if !acks.contains(&id) {
                acks.push(id);
            }
            if self.seen.contains_key(&id) {
                debug!(sender = %sender, "Duplicate log message ignored");
            } else {
                self.seen.insert(id, self.epoch);
                fresh.push(message.body);
            }
        }
        fresh
    }

    /// Deliveries still owed to `peer`.
    pub fn owed_to(&self, peer: &PublicKey) -> &[Delivery] {
        self.outgoing.get(peer).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Messages still held for delivery.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Received ids remembered for deduplication.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    // =========================================================================
    // PRUNING
    // =========================================================================

    /// Drop each of `ids` that no peer is owed any more.
    fn prune_settled(&mut self, ids: &[LogMessageId]) {
        for id in ids {
            let owed = self
                .outgoing
                .values()
                .flatten()
                .any(|d| d.message_id == *id);
            if owed {
                continue;
            }
            let Some(message) = self.messages.remove(id) else {
                continue;
            };
            if let Some(group) = self.groups.get_mut(&message.group_id) {
                group.messages.retain(|m| m != id);
            }
        }
    }

    fn expire_seen(&mut self) {
        let retention = retransmission_span(&self.params).saturating_mul(2);
        let epoch = self.epoch;
        let before = self.seen.len();
        self.seen
            .retain(|_, first| epoch.saturating_sub(*first) <= retention);
        let expired = before - self.seen.len();
        if expired > 0 {
            debug!(expired, "Expired received message ids");
        }
    }
}

/// Ticks a sender using `params` keeps retransmitting one message.
pub fn retransmission_span(params: &SyncParams) -> u64 {
    (1..=params.max_send_attempts)
        .map(|attempt| backoff(params.retransmission_base_epochs, attempt).max(1))
        .fold(0, u64::saturating_add)
}

/// Ticks to wait after the `attempt`-th send: `base * 2^(attempt-1)`.
pub fn backoff(base: u64, attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(32);
    base.saturating_mul(1u64 << exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: GroupId = GroupId([1; 32]);

    fn params() -> SyncParams {
        SyncParams {
            max_batch_bytes: 1000,
            retransmission_base_epochs: 1,
            max_send_attempts: 3,
        }
    }

    fn peer(n: u8) -> PublicKey {
        PublicKey([n; 33])
    }

    fn message(ts: u64, body: &[u8]) -> LogMessage {
        LogMessage {
            group_id: GROUP,
            timestamp: ts,
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_append_to_unknown_group_fails() {
        let mut state = SyncState::new(params());
        assert_eq!(
            state.append(message(1, b"x")),
            Err(DatasyncError::UnknownGroup(GROUP))
        );
    }

    #[test]
    fn test_add_peer_twice_reports_existing_member() {
        let mut state = SyncState::new(params());
        assert!(state.add_peer(GROUP, peer(2)));
        assert!(!state.add_peer(GROUP, peer(2)));
        assert!(state.is_peer_in_group(&GROUP, &peer(2)));
        assert!(!state.is_peer_in_group(&GROUP, &peer(3)));
    }

    #[test]
    fn test_append_schedules_for_members() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.append(message(1, b"hello")).unwrap();

        let batches = state.flush(0);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].peer, peer(2));
        assert_eq!(batches[0].payload.messages[0].body, b"hello");
    }

    #[test]
    fn test_late_peer_receives_history() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.append(message(1, b"early")).unwrap();
        state.add_peer(GROUP, peer(3));

        let batches = state.flush(0);
        let late: Vec<_> = batches.iter().filter(|b| b.peer == peer(3)).collect();
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].payload.messages[0].body, b"early");
    }

    #[test]
    fn test_duplicate_append_is_idempotent() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        let a = state.append(message(1, b"same")).unwrap();
        let b = state.append(message(1, b"same")).unwrap();
        assert_eq!(a, b);
        assert_eq!(state.owed_to(&peer(2)).len(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(2, 1), 2);
        assert_eq!(backoff(2, 2), 4);
        assert_eq!(backoff(2, 3), 8);
        assert_eq!(backoff(u64::MAX, 40), u64::MAX);
    }

    #[test]
    fn test_retransmission_follows_backoff() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.append(message(1, b"retry")).unwrap();

        // attempt 1 at epoch 0, due again at 0 + 1
        assert_eq!(state.flush(0).len(), 1);
        // attempt 2 at epoch 1, due again at 1 + 2
        assert_eq!(state.flush(1).len(), 1);
        assert!(state.flush(2).is_empty());
        // attempt 3 at epoch 3
        assert_eq!(state.flush(3).len(), 1);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.append(message(1, b"lost")).unwrap();

        let mut sends = 0;
        for epoch in 0..100 {
            sends += state.flush(epoch).len();
        }
        assert_eq!(sends, 3);
        assert!(state.owed_to(&peer(2)).is_empty());
    }

    #[test]
    fn test_ack_stops_retransmission() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        let id = state.append(message(1, b"acked")).unwrap();
        state.flush(0);

        state.handle(
            peer(2),
            Payload {
                acks: vec![id],
                messages: vec![],
            },
        );

        assert!(state.owed_to(&peer(2)).is_empty());
        assert!(state.flush(10).is_empty());
    }

    #[test]
    fn test_handle_dedups_and_acks_every_copy() {
        let mut state = SyncState::new(params());
        let incoming = Payload {
            acks: vec![],
            messages: vec![message(5, b"once")],
        };

        assert_eq!(state.handle(peer(4), incoming.clone()), vec![b"once".to_vec()]);
        assert_eq!(state.flush(0)[0].payload.acks.len(), 1);

        // Retransmitted copy: not surfaced again, but acked again.
        assert!(state.handle(peer(4), incoming).is_empty());
        let batches = state.flush(1);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].payload.acks, vec![message(5, b"once").id()]);
        assert!(batches[0].payload.messages.is_empty());
    }

    #[test]
    fn test_message_pruned_once_every_member_acks() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.add_peer(GROUP, peer(3));
        let id = state.append(message(1, b"both")).unwrap();
        state.flush(0);

        let ack = Payload {
            acks: vec![id],
            messages: vec![],
        };
        state.handle(peer(2), ack.clone());
        assert_eq!(state.message_count(), 1);
        state.handle(peer(3), ack);
        assert_eq!(state.message_count(), 0);

        // Settled history is not replayed to a late member.
        state.add_peer(GROUP, peer(4));
        assert!(state.owed_to(&peer(4)).is_empty());
    }

    #[test]
    fn test_message_pruned_after_give_up() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.append(message(1, b"lost")).unwrap();

        for epoch in 0..100 {
            state.flush(epoch);
        }
        assert_eq!(state.message_count(), 0);
    }

    #[test]
    fn test_retransmission_span() {
        // 1 + 2 + 4
        assert_eq!(retransmission_span(&params()), 7);
        let every_tick = SyncParams {
            retransmission_base_epochs: 0,
            ..params()
        };
        assert_eq!(retransmission_span(&every_tick), 3);
    }

    #[test]
    fn test_seen_ids_expire_after_retention() {
        let mut state = SyncState::new(params());
        let incoming = Payload {
            acks: vec![],
            messages: vec![message(5, b"old")],
        };
        state.handle(peer(4), incoming.clone());
        assert_eq!(state.seen_count(), 1);

        // Twice the span: still remembered.
        state.flush(14);
        assert!(state.handle(peer(4), incoming.clone()).is_empty());

        state.flush(15);
        assert_eq!(state.seen_count(), 0);
        assert_eq!(state.handle(peer(4), incoming), vec![b"old".to_vec()]);
    }

    #[test]
    fn test_batches_respect_budget() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        for ts in 0..3 {
            state.append(message(ts, &[0u8; 400])).unwrap();
        }

        let batches = state.flush(0);
        // 448 bytes each against a 1000 byte budget: two fit, one spills.
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].payload.messages.len(), 2);
        assert_eq!(batches[1].payload.messages.len(), 1);
    }

    #[test]
    fn test_oversized_message_sent_alone() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.append(message(0, &[0u8; 10])).unwrap();
        state.append(message(1, &[0u8; 5000])).unwrap();
        state.append(message(2, &[0u8; 10])).unwrap();

        let batches = state.flush(0);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].payload.messages[0].body.len(), 5000);
    }

    #[test]
    fn test_acks_ride_in_first_batch() {
        let mut state = SyncState::new(params());
        state.add_peer(GROUP, peer(2));
        state.handle(
            peer(2),
            Payload {
                acks: vec![],
                messages: vec![message(9, b"in")],
            },
        );
        state.append(message(1, &[0u8; 900])).unwrap();
        state.append(message(2, &[0u8; 900])).unwrap();

        let batches = state.flush(0);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].payload.acks.len(), 1);
        assert!(batches[1].payload.acks.is_empty());
    }
}
