//! # Data Sync Node
//!
//! Thread-safe front of the replicated log. Owns the sync state, the tick
//! counter and the background flush loop, which hands encoded batches to
//! whoever `init` was given the channel of.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use shared_types::{FlushBatch, GroupId, PublicKey};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::codec::{decode_payload, encode_payload};
use crate::config::DatasyncConfig;
use crate::domain::{DatasyncError, LogMessage, LogMessageId, SyncParams, SyncState};

struct FlushLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The replicated log.
pub struct DataSyncNode {
    config: DatasyncConfig,
    state: Mutex<SyncState>,
    epoch: AtomicU64,
    outbox: Mutex<Option<mpsc::Sender<FlushBatch>>>,
    flush_loop: Mutex<Option<FlushLoop>>,
}

impl DataSyncNode {
    /// Create an idle log.
    pub fn new(config: DatasyncConfig) -> Self {
        let params = SyncParams {
            max_batch_bytes: config.max_batch_bytes,
            retransmission_base_epochs: config.retransmission_base_epochs,
            max_send_attempts: config.max_send_attempts,
        };
        Self {
            config,
            state: Mutex::new(SyncState::new(params)),
            epoch: AtomicU64::new(0),
            outbox: Mutex::new(None),
            flush_loop: Mutex::new(None),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &DatasyncConfig {
        &self.config
    }

    // =========================================================================
    // MEMBERSHIP AND APPEND
    // =========================================================================

    /// Whether `peer` is a member of `group`.
    pub fn is_peer_in_group(&self, group: &GroupId, peer: &PublicKey) -> bool {
        self.state.lock().is_peer_in_group(group, peer)
    }

    /// Add `peer` to `group`. Returns `false` if it was already a member.
    pub fn add_peer(&self, group: GroupId, peer: PublicKey) -> bool {
        self.state.lock().add_peer(group, peer)
    }

    /// Append `body` to `group`, stamped with the current time.
    pub fn append_message(
        &self,
        group: GroupId,
        body: Vec<u8>,
    ) -> Result<LogMessageId, DatasyncError> {
        let message = LogMessage {
            group_id: group,
            timestamp: now_millis(),
            body,
        };
        self.state.lock().append(message)
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply bytes received from `sender`.
    ///
    /// `Ok(None)` means the bytes are not a log payload. Otherwise returns
    /// the bodies of messages not seen before.
    pub fn handle_payload(
        &self,
        sender: PublicKey,
        bytes: &[u8],
    ) -> Result<Option<Vec<Vec<u8>>>, DatasyncError> {
        let Some(payload) = decode_payload(bytes)? else {
            return Ok(None);
        };
        debug!(
            sender = %sender,
            messages = payload.messages.len(),
            acks = payload.acks.len(),
            "Handling log payload"
        );
        Ok(Some(self.state.lock().handle(sender, payload)))
    }

    // =========================================================================
    // FLUSH
    // =========================================================================

    /// Advance one tick and encode everything due.
    pub fn tick(&self) -> Result<Vec<FlushBatch>, DatasyncError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
        let batches = self.state.lock().flush(epoch);

        batches
            .into_iter()
            .map(|batch| {
                let payload = encode_payload(&batch.payload)?;
                let bodies = batch
                    .payload
                    .messages
                    .into_iter()
                    .map(|m| m.body)
                    .collect();
                Ok(FlushBatch {
                    recipient: batch.peer,
                    payload,
                    bodies,
                })
            })
            .collect()
    }

    /// Tick once and push the batches into the outbox.
    ///
    /// Returns the number of batches handed over.
    pub async fn flush_now(&self) -> Result<usize, DatasyncError> {
        let outbox = self
            .outbox
            .lock()
            .clone()
            .ok_or(DatasyncError::NotInitialized)?;

        let batches = self.tick()?;
        let count = batches.len();
        for batch in batches {
            outbox
                .send(batch)
                .await
                .map_err(|_| DatasyncError::OutboxClosed)?;
        }
        Ok(count)
    }

    /// Current tick.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Give the log the channel its flushes go to.
    pub fn init(&self, outbox: mpsc::Sender<FlushBatch>) {
        *self.outbox.lock() = Some(outbox);
    }

    /// Spawn the flush loop on the current runtime.
    pub fn start(self: &Arc<Self>, tick: Duration) -> Result<(), DatasyncError> {
        if tick.is_zero() {
            return Err(DatasyncError::InvalidConfig(
                "flush tick cannot be zero".into(),
            ));
        }
        if self.outbox.lock().is_none() {
            return Err(DatasyncError::NotInitialized);
        }
        let mut guard = self.flush_loop.lock();
        if guard.is_some() {
            return Err(DatasyncError::AlreadyRunning);
        }

        let (shutdown, mut stopped) = watch::channel(false);
        let node = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match node.flush_now().await {
                            Ok(_) => {}
                            Err(DatasyncError::OutboxClosed) => {
                                warn!("Flush outbox closed, stopping flush loop");
                                break;
                            }
                            Err(e) => warn!(error = %e, "Flush failed"),
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Flush loop exited");
        });

        *guard = Some(FlushLoop { shutdown, handle });
        info!(tick_ms = tick.as_millis() as u64, "Replicated log started");
        Ok(())
    }

    /// Stop the flush loop. Safe to call repeatedly or before `start`.
    pub fn stop(&self) {
        let Some(flush_loop) = self.flush_loop.lock().take() else {
            return;
        };
        // The loop may already have exited on a closed outbox.
        let _ = flush_loop.shutdown.send(true);
        flush_loop.handle.abort();
        info!("Replicated log stopped");
    }

    /// Whether the flush loop is running.
    pub fn is_running(&self) -> bool {
        self.flush_loop
            .lock()
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }
}

impl Drop for DataSyncNode {
    fn drop(&mut self) {
        self.stop();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::one_to_one_group_id;

    fn keys() -> (PublicKey, PublicKey) {
        (PublicKey([2; 33]), PublicKey([3; 33]))
    }

    fn node() -> Arc<DataSyncNode> {
        Arc::new(DataSyncNode::new(DatasyncConfig::for_testing()))
    }

    #[test]
    fn test_tick_emits_flush_batch_with_bodies() {
        let node = node();
        let (me, peer) = keys();
        let group = one_to_one_group_id(&me, &peer);
        node.add_peer(group, peer);
        node.append_message(group, b"wrapped".to_vec()).unwrap();

        let batches = node.tick().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].recipient, peer);
        assert_eq!(batches[0].bodies, vec![b"wrapped".to_vec()]);
        assert_eq!(node.epoch(), 1);
    }

    #[test]
    fn test_payload_round_trip_between_nodes() {
        let alice = node();
        let bob = node();
        let (a, b) = keys();
        let group = one_to_one_group_id(&a, &b);

        alice.add_peer(group, b);
        alice.append_message(group, b"hi bob".to_vec()).unwrap();
        let batch = alice.tick().unwrap().remove(0);

        let bodies = bob.handle_payload(a, &batch.payload).unwrap().unwrap();
        assert_eq!(bodies, vec![b"hi bob".to_vec()]);

        // Bob's ack clears Alice's retransmission.
        let ack = bob.tick().unwrap().remove(0);
        assert_eq!(ack.recipient, a);
        assert!(ack.bodies.is_empty());
        assert_eq!(alice.handle_payload(b, &ack.payload).unwrap(), Some(vec![]));
        for _ in 0..10 {
            assert!(alice.tick().unwrap().is_empty());
        }
    }

    #[test]
    fn test_plain_bytes_are_not_handled() {
        let node = node();
        assert_eq!(
            node.handle_payload(PublicKey([2; 33]), b"not a log payload")
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_flush_now_requires_init() {
        let node = node();
        assert_eq!(node.flush_now().await, Err(DatasyncError::NotInitialized));
    }

    #[tokio::test]
    async fn test_start_requires_init() {
        let node = node();
        assert_eq!(
            node.start(Duration::from_millis(10)),
            Err(DatasyncError::NotInitialized)
        );
    }

    #[tokio::test]
    async fn test_start_rejects_zero_tick() {
        let node = node();
        let (tx, _rx) = mpsc::channel(8);
        node.init(tx);

        assert!(matches!(
            node.start(Duration::ZERO),
            Err(DatasyncError::InvalidConfig(_))
        ));
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn test_flush_loop_delivers_batches() {
        let node = node();
        let (tx, mut rx) = mpsc::channel(8);
        node.init(tx);

        let (me, peer) = keys();
        let group = one_to_one_group_id(&me, &peer);
        node.add_peer(group, peer);
        node.append_message(group, b"looped".to_vec()).unwrap();

        node.start(Duration::from_millis(5)).unwrap();
        assert_eq!(
            node.start(Duration::from_millis(5)),
            Err(DatasyncError::AlreadyRunning)
        );

        let batch = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("batch");
        assert_eq!(batch.bodies, vec![b"looped".to_vec()]);

        node.stop();
        node.stop();
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let node = node();
        node.stop();
        assert!(!node.is_running());
    }
}
