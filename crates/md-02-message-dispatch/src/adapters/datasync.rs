//! # Replicated Log Adapter
//!
//! Implements [`ReplicatedLog`] over the in-memory `DataSyncNode`.

use md_01_datasync::{DataSyncNode, DatasyncConfig, DatasyncError};
use shared_types::{FlushBatch, GroupId, Hash, PublicKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::ReplicationError;
use crate::ports::outbound::ReplicatedLog;

/// Replicated log backed by `md-01-datasync`.
pub struct DatasyncLog {
    node: Arc<DataSyncNode>,
}

impl DatasyncLog {
    pub fn new(config: DatasyncConfig) -> Self {
        Self::from_node(Arc::new(DataSyncNode::new(config)))
    }

    pub fn from_node(node: Arc<DataSyncNode>) -> Self {
        Self { node }
    }

    /// The underlying node, for inspection and manual flushes.
    pub fn node(&self) -> &Arc<DataSyncNode> {
        &self.node
    }
}

impl ReplicatedLog for DatasyncLog {
    fn is_peer_in_group(&self, group: &GroupId, peer: &PublicKey) -> Result<bool, ReplicationError> {
        Ok(self.node.is_peer_in_group(group, peer))
    }

    fn add_peer(&self, group: GroupId, peer: PublicKey) -> Result<(), ReplicationError> {
        self.node.add_peer(group, peer);
        Ok(())
    }

    fn append_message(&self, group: GroupId, wrapped: Vec<u8>) -> Result<Hash, ReplicationError> {
        self.node
            .append_message(group, wrapped)
            .map_err(|e| ReplicationError::Append(e.to_string()))
    }

    fn init(&self, outbox: mpsc::Sender<FlushBatch>) {
        self.node.init(outbox);
    }

    fn start(&self, tick: Duration) -> Result<(), ReplicationError> {
        match self.node.start(tick) {
            Ok(()) | Err(DatasyncError::AlreadyRunning) => Ok(()),
            Err(e) => Err(ReplicationError::Lifecycle(e.to_string())),
        }
    }

    fn stop(&self) {
        self.node.stop();
    }

    /// Plain bytes come back as one message; a log payload yields its
    /// unseen messages, possibly none.
    fn extract_messages(
        &self,
        sender: &PublicKey,
        payload: &[u8],
    ) -> Result<Vec<Vec<u8>>, ReplicationError> {
        match self.node.handle_payload(*sender, payload) {
            Ok(Some(bodies)) => Ok(bodies),
            Ok(None) => Ok(vec![payload.to_vec()]),
            Err(e) => Err(ReplicationError::Extract(e.to_string())),
        }
    }
}
