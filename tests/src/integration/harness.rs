//! # Node Fixture
//!
//! A dispatcher wired to the replicated log, an in-memory transport and its
//! own event bus, plus helpers that drain inboxes through the inbound
//! pipeline until a condition holds.

use md_02_message_dispatch::testing::{InMemoryEncryption, InMemoryNetwork, InMemoryTransport};
use md_02_message_dispatch::{
    BusNotifier, DatasyncLog, DispatchConfig, Identity, MessageDispatchApi, MessageDispatcher,
    RawMessage, StatusMessage,
};
use shared_bus::InMemoryEventBus;
use shared_types::{MessageType, PublicKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub type DatasyncDispatcher = MessageDispatcher<InMemoryEncryption, DatasyncLog, InMemoryTransport>;

const PUMP_INTERVAL: Duration = Duration::from_millis(5);

/// Install a test subscriber once. Honors `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Node {
    pub dispatcher: Arc<DatasyncDispatcher>,
    pub encryption: Arc<InMemoryEncryption>,
    pub log: Arc<DatasyncLog>,
    pub transport: Arc<InMemoryTransport>,
    pub bus: Arc<InMemoryEventBus>,
    pub key: PublicKey,
}

impl Node {
    pub fn new(network: &Arc<InMemoryNetwork>, config: DispatchConfig) -> Self {
        let identity = Identity::generate();
        let key = identity.public_key();
        let encryption = Arc::new(InMemoryEncryption::new());
        let log = Arc::new(DatasyncLog::new(config.datasync_config()));
        let transport = Arc::new(network.transport(key));
        let bus = Arc::new(InMemoryEventBus::new());

        let dispatcher = MessageDispatcher::new(
            config,
            identity,
            Arc::clone(&encryption),
            Arc::clone(&log),
            Arc::clone(&transport),
        )
        .with_notifier(Arc::new(BusNotifier::new(Arc::clone(&bus))));

        Self {
            dispatcher: Arc::new(dispatcher),
            encryption,
            log,
            transport,
            bus,
            key,
        }
    }

    /// Run every waiting envelope through the inbound pipeline.
    pub async fn receive(&self) -> Vec<StatusMessage> {
        let envelopes = self.transport.network().drain(&self.key);
        let mut messages = Vec::new();
        for envelope in envelopes {
            let decoded = self
                .dispatcher
                .process_incoming(envelope, true)
                .await
                .expect("envelopes on the test network are well formed");
            messages.extend(decoded);
        }
        messages
    }
}

/// Exchange bundles between two nodes.
pub fn introduce(a: &Node, b: &Node) {
    InMemoryEncryption::introduce((&a.key, &a.encryption), (&b.key, &b.encryption));
}

pub fn chat(text: &str) -> RawMessage {
    RawMessage::new(text.as_bytes().to_vec(), MessageType::Unknown)
}

/// Pump every node's inbox until `done` holds or `limit` passes.
///
/// Returns what each node decoded, indexed like `nodes`.
pub async fn pump_until(
    nodes: &[&Node],
    limit: Duration,
    done: impl Fn(&[Vec<StatusMessage>]) -> bool,
) -> Vec<Vec<StatusMessage>> {
    let deadline = Instant::now() + limit;
    let mut received = vec![Vec::new(); nodes.len()];
    while Instant::now() < deadline {
        for (index, node) in nodes.iter().enumerate() {
            received[index].extend(node.receive().await);
        }
        if done(&received) {
            break;
        }
        tokio::time::sleep(PUMP_INTERVAL).await;
    }
    received
}

/// Pump every node's inbox for `duration`.
pub async fn pump_for(nodes: &[&Node], duration: Duration) -> Vec<Vec<StatusMessage>> {
    pump_until(nodes, duration, |_| false).await
}

/// Envelopes `from` has put on the network for `to` so far.
pub fn sent_between(network: &InMemoryNetwork, from: &PublicKey, to: &PublicKey) -> usize {
    network
        .sent()
        .iter()
        .filter(|s| s.from == *from && s.to == Some(*to))
        .count()
}
