//! In-memory publish/subscribe network.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::Keccak256Hasher;
use shared_types::{MessageId, NetworkMessage, PublicKey, TransportHash, TransportMessage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{SharedSecret, TransportError};
use crate::ports::outbound::Transport;

/// Which transport operation carried an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPath {
    SharedSecret,
    Partitioned,
    Public(String),
}

/// Record of one envelope the network carried.
#[derive(Debug, Clone)]
pub struct SentEnvelope {
    pub from: PublicKey,
    pub to: Option<PublicKey>,
    pub path: DeliveryPath,
    pub message: NetworkMessage,
    pub hash: TransportHash,
}

/// Shared medium every `InMemoryTransport` of a test talks through.
///
/// Envelopes are stamped with the sender's key as `sig`.
#[derive(Debug, Default)]
pub struct InMemoryNetwork {
    inboxes: Mutex<HashMap<PublicKey, VecDeque<TransportMessage>>>,
    public_members: Mutex<HashMap<String, Vec<PublicKey>>>,
    sent: Mutex<Vec<SentEnvelope>>,
    counter: AtomicU64,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport endpoint for `owner`.
    pub fn transport(self: &Arc<Self>, owner: PublicKey) -> InMemoryTransport {
        InMemoryTransport {
            owner,
            network: Arc::clone(self),
            tracked: Mutex::new(Vec::new()),
            secrets: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            fail_secret_installs: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    /// Subscribe `member` to the public topic of `chat_name`.
    pub fn join_public(&self, chat_name: &str, member: PublicKey) {
        self.public_members
            .lock()
            .entry(chat_name.to_string())
            .or_default()
            .push(member);
    }

    /// Take every envelope waiting for `key`.
    pub fn drain(&self, key: &PublicKey) -> Vec<TransportMessage> {
        self.inboxes
            .lock()
            .get_mut(key)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// Envelopes waiting for `key`.
    pub fn pending(&self, key: &PublicKey) -> usize {
        self.inboxes.lock().get(key).map_or(0, VecDeque::len)
    }

    /// Every envelope carried so far.
    pub fn sent(&self) -> Vec<SentEnvelope> {
        self.sent.lock().clone()
    }

    fn deliver(
        &self,
        from: PublicKey,
        to: Option<PublicKey>,
        path: DeliveryPath,
        message: &NetworkMessage,
    ) -> TransportHash {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Keccak256Hasher::new();
        hasher
            .update(from.as_bytes())
            .update(&sequence.to_be_bytes())
            .update(&message.payload);
        let hash = hasher.finalize();

        let recipients = match (&path, to) {
            (DeliveryPath::Public(chat_name), _) => self
                .public_members
                .lock()
                .get(chat_name)
                .cloned()
                .unwrap_or_default(),
            (_, Some(to)) => vec![to],
            (_, None) => Vec::new(),
        };

        {
            let mut inboxes = self.inboxes.lock();
            for recipient in recipients {
                let mut envelope =
                    TransportMessage::new(from.as_bytes().to_vec(), message.payload.clone(), hash);
                envelope.dst = to.map(|k| k.as_bytes().to_vec());
                envelope.ttl = message.ttl;
                inboxes.entry(recipient).or_default().push_back(envelope);
            }
        }

        self.sent.lock().push(SentEnvelope {
            from,
            to,
            path,
            message: message.clone(),
            hash,
        });
        hash
    }
}

/// One node's endpoint on an `InMemoryNetwork`.
#[derive(Debug)]
pub struct InMemoryTransport {
    owner: PublicKey,
    network: Arc<InMemoryNetwork>,
    tracked: Mutex<Vec<(Vec<MessageId>, TransportHash)>>,
    secrets: Mutex<Vec<SharedSecret>>,
    fail_sends: AtomicBool,
    fail_secret_installs: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryTransport {
    /// Make every send fail until reset.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every `process_negotiated_secrets` fail until reset.
    pub fn fail_secret_installs(&self, fail: bool) {
        self.fail_secret_installs.store(fail, Ordering::SeqCst);
    }

    /// Delay every send by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Calls to `track`, in order.
    pub fn tracked(&self) -> Vec<(Vec<MessageId>, TransportHash)> {
        self.tracked.lock().clone()
    }

    /// Secrets handed to `process_negotiated_secrets`.
    pub fn installed_secrets(&self) -> Vec<SharedSecret> {
        self.secrets.lock().clone()
    }

    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }

    async fn before_send(&self) -> Result<(), TransportError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send_private_with_shared_secret(
        &self,
        message: &NetworkMessage,
        recipient: &PublicKey,
        _secret: &SharedSecret,
    ) -> Result<TransportHash, TransportError> {
        self.before_send().await?;
        Ok(self.network.deliver(
            self.owner,
            Some(*recipient),
            DeliveryPath::SharedSecret,
            message,
        ))
    }

    async fn send_private_with_partitioned(
        &self,
        message: &NetworkMessage,
        recipient: &PublicKey,
    ) -> Result<TransportHash, TransportError> {
        self.before_send().await?;
        Ok(self.network.deliver(
            self.owner,
            Some(*recipient),
            DeliveryPath::Partitioned,
            message,
        ))
    }

    async fn send_public(
        &self,
        message: &NetworkMessage,
        chat_name: &str,
    ) -> Result<TransportHash, TransportError> {
        self.before_send().await?;
        Ok(self.network.deliver(
            self.owner,
            None,
            DeliveryPath::Public(chat_name.to_string()),
            message,
        ))
    }

    fn track(&self, message_ids: &[MessageId], hash: TransportHash, _message: &NetworkMessage) {
        self.tracked.lock().push((message_ids.to_vec(), hash));
    }

    async fn process_negotiated_secrets(
        &self,
        secrets: Vec<SharedSecret>,
    ) -> Result<(), TransportError> {
        if self.fail_secret_installs.load(Ordering::SeqCst) {
            return Err(TransportError::SharedSecret("injected failure".into()));
        }
        self.secrets.lock().extend(secrets);
        Ok(())
    }
}
