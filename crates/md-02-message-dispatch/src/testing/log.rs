//! Replicated-log double that records calls and never flushes on its own.

use parking_lot::Mutex;
use shared_crypto::keccak256;
use shared_types::{FlushBatch, GroupId, Hash, PublicKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::ReplicationError;
use crate::ports::outbound::ReplicatedLog;

#[derive(Debug, Default)]
pub struct StaticLog {
    members: Mutex<HashMap<GroupId, Vec<PublicKey>>>,
    appended: Mutex<Vec<(GroupId, Vec<u8>)>>,
    add_peer_calls: AtomicUsize,
    extracted: Mutex<Option<Vec<Vec<u8>>>>,
    extract_error: Mutex<Option<ReplicationError>>,
    outbox: Mutex<Option<mpsc::Sender<FlushBatch>>>,
    started: AtomicBool,
    stop_calls: AtomicUsize,
}

impl StaticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every extraction return `bodies`.
    pub fn with_extracted(self, bodies: Vec<Vec<u8>>) -> Self {
        *self.extracted.lock() = Some(bodies);
        self
    }

    /// Make every extraction fail with `error`.
    pub fn fail_extraction(&self, error: ReplicationError) {
        *self.extract_error.lock() = Some(error);
    }

    pub fn appended(&self) -> Vec<(GroupId, Vec<u8>)> {
        self.appended.lock().clone()
    }

    pub fn members(&self, group: &GroupId) -> Vec<PublicKey> {
        self.members.lock().get(group).cloned().unwrap_or_default()
    }

    pub fn add_peer_calls(&self) -> usize {
        self.add_peer_calls.load(Ordering::SeqCst)
    }

    /// The channel `init` was given, to inject flush batches.
    pub fn outbox(&self) -> Option<mpsc::Sender<FlushBatch>> {
        self.outbox.lock().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl ReplicatedLog for StaticLog {
    fn is_peer_in_group(&self, group: &GroupId, peer: &PublicKey) -> Result<bool, ReplicationError> {
        Ok(self
            .members
            .lock()
            .get(group)
            .is_some_and(|members| members.contains(peer)))
    }

    fn add_peer(&self, group: GroupId, peer: PublicKey) -> Result<(), ReplicationError> {
        self.add_peer_calls.fetch_add(1, Ordering::SeqCst);
        let mut members = self.members.lock();
        let group = members.entry(group).or_default();
        if !group.contains(&peer) {
            group.push(peer);
        }
        Ok(())
    }

    fn append_message(&self, group: GroupId, wrapped: Vec<u8>) -> Result<Hash, ReplicationError> {
        if !self.members.lock().contains_key(&group) {
            return Err(ReplicationError::Append("unknown group".into()));
        }
        let id = keccak256(&wrapped);
        self.appended.lock().push((group, wrapped));
        Ok(id)
    }

    fn init(&self, outbox: mpsc::Sender<FlushBatch>) {
        *self.outbox.lock() = Some(outbox);
    }

    fn start(&self, _tick: Duration) -> Result<(), ReplicationError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
    }

    fn extract_messages(
        &self,
        _sender: &PublicKey,
        payload: &[u8],
    ) -> Result<Vec<Vec<u8>>, ReplicationError> {
        if let Some(error) = self.extract_error.lock().clone() {
            return Err(error);
        }
        Ok(self
            .extracted
            .lock()
            .clone()
            .unwrap_or_else(|| vec![payload.to_vec()]))
    }
}
