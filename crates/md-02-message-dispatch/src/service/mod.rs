//! # Message Dispatcher
//!
//! Implements [`MessageDispatchApi`] over the three collaborators.
//!
//! ## Outbound
//!
//! ```text
//! RawMessage ─→ wrap ─→ id ─┬─ ReplicatedLog mode ─→ add peer, append ──┐
//!                           │                                            │ flush tick
//!                           │                                  FlushBatch channel
//!                           │                                            ▼
//!                           └─ Direct mode ─────────→ build_direct ─→ transport path
//! ```
//!
//! ## Concurrency
//!
//! Sends run on the caller's task. The flush worker runs on its own task,
//! concurrently with caller sends. Membership check-then-add and append for
//! one delivery group happen under that group's lock.

mod inbound;
mod outbound;
mod recovery;
mod transport;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::DispatchEvent;
use shared_types::{GroupId, MessageId, PublicKey, TransportMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::DispatchConfig;
use crate::domain::{
    DeliveryMode, DispatchError, Identity, InboundReport, RawMessage, SendContext, StatusMessage,
};
use crate::ports::inbound::MessageDispatchApi;
use crate::ports::outbound::{
    DispatchNotifier, EncryptionProtocol, NoopNotifier, ReplicatedLog, SystemTimeSource,
    TimeSource, Transport,
};

struct FlushWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The dispatch core.
///
/// ## Dependencies
///
/// - `E: EncryptionProtocol` - sessions and ciphertext
/// - `L: ReplicatedLog` - at-least-once delivery
/// - `T: Transport` - network I/O
pub struct MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol,
    L: ReplicatedLog,
    T: Transport,
{
    config: DispatchConfig,
    identity: Arc<Identity>,
    public_key: PublicKey,
    encryption: Arc<E>,
    log: Arc<L>,
    transport: Arc<T>,
    notifier: Arc<dyn DispatchNotifier>,
    clock: Arc<dyn TimeSource>,
    /// One lock per delivery group, serializing check-then-add and append.
    group_locks: Mutex<HashMap<GroupId, Arc<Mutex<()>>>>,
    worker: Mutex<Option<FlushWorker>>,
}

impl<E, L, T> MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol + 'static,
    L: ReplicatedLog + 'static,
    T: Transport + 'static,
{
    pub fn new(
        config: DispatchConfig,
        identity: Identity,
        encryption: Arc<E>,
        log: Arc<L>,
        transport: Arc<T>,
    ) -> Self {
        let public_key = identity.public_key();
        Self {
            config,
            identity: Arc::new(identity),
            public_key,
            encryption,
            log,
            transport,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemTimeSource),
            group_locks: Mutex::new(HashMap::new()),
            worker: Mutex::new(None),
        }
    }

    /// Publish dispatch events through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn DispatchNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Read time from `clock` instead of the system clock.
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// This node's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Whether `message` was authored by this node.
    pub fn is_own_message(&self, message: &StatusMessage) -> bool {
        message.is_from(&self.public_key)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Wire the replicated log to the flush worker and start both.
    ///
    /// Direct mode has no log to drive; starting is then a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), DispatchError> {
        self.config
            .validate()
            .map_err(|e| DispatchError::InvalidConfig(e.to_string()))?;

        if self.config.delivery_mode == DeliveryMode::Direct {
            debug!("Direct delivery, no flush worker");
            return Ok(());
        }

        let mut guard = self.worker.lock();
        if guard.is_some() {
            return Ok(());
        }

        let (outbox, mut batches) = mpsc::channel(self.config.worker_channel_capacity);
        self.log.init(outbox);
        self.log.start(self.config.datasync_tick())?;

        let (shutdown, mut stopped) = watch::channel(false);
        let dispatcher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    batch = batches.recv() => match batch {
                        Some(batch) => dispatcher.dispatch_flush_batch(batch).await,
                        None => break,
                    },
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Flush worker exited");
        });

        *guard = Some(FlushWorker { shutdown, handle });
        info!(
            public_key = %self.public_key,
            tick_ms = self.config.datasync_tick_ms,
            "Message dispatcher started"
        );
        Ok(())
    }

    /// Stop the log and the flush worker. Safe to call repeatedly.
    ///
    /// The first call that finds something running publishes
    /// `DispatcherStopped`.
    pub async fn stop(&self) {
        self.log.stop();
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };
        let _ = worker.shutdown.send(true);
        // A batch mid-dispatch finishes; the next select observes shutdown.
        let _ = worker.handle.await;
        self.notifier.notify(DispatchEvent::DispatcherStopped).await;
        info!(public_key = %self.public_key, "Message dispatcher stopped");
    }

    /// Whether the flush worker is running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    fn group_lock(&self, group: GroupId) -> Arc<Mutex<()>> {
        Arc::clone(self.group_locks.lock().entry(group).or_default())
    }

    /// Hand back a lock from `group_lock`, dropping the entry once no send
    /// holds it.
    fn release_group_lock(&self, group: &GroupId, lock: Arc<Mutex<()>>) {
        let mut locks = self.group_locks.lock();
        drop(lock);
        if locks.get(group).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(group);
        }
    }

    #[cfg(test)]
    pub(crate) fn group_lock_count(&self) -> usize {
        self.group_locks.lock().len()
    }
}

#[async_trait]
impl<E, L, T> MessageDispatchApi for MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol + 'static,
    L: ReplicatedLog + 'static,
    T: Transport + 'static,
{
    async fn send_private(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        self.send_private_raw(ctx, recipient, message).await
    }

    async fn send_group(
        &self,
        ctx: &SendContext,
        recipients: &[PublicKey],
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        self.send_group_raw(ctx, recipients, message).await
    }

    async fn send_public(
        &self,
        ctx: &SendContext,
        chat_name: &str,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        self.send_public_raw(ctx, chat_name, message).await
    }

    async fn send_pair_installation(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        self.send_pair_installation_raw(ctx, recipient, message).await
    }

    async fn process_incoming(
        &self,
        message: TransportMessage,
        want_application: bool,
    ) -> Result<Vec<StatusMessage>, DispatchError> {
        let InboundReport { messages, .. } =
            self.process_incoming_report(message, want_application).await?;
        Ok(messages)
    }
}
