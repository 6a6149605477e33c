//! In-memory collaborators for tests.
//!
//! Compiled under `cfg(test)` and with the `test-utils` feature.

mod encryption;
mod log;
mod network;

pub use encryption::{InMemoryEncryption, ADVERTISEMENT_COOLDOWN_SECONDS};
pub use log::StaticLog;
pub use network::{DeliveryPath, InMemoryNetwork, InMemoryTransport, SentEnvelope};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::DispatchEvent;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ports::outbound::{DispatchNotifier, TimeSource};

/// Controllable clock.
#[derive(Debug, Default)]
pub struct MockTimeSource {
    now: AtomicU64,
}

impl MockTimeSource {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Notifier that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<DispatchEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl DispatchNotifier for RecordingNotifier {
    async fn notify(&self, event: DispatchEvent) {
        self.events.lock().push(event);
    }
}
