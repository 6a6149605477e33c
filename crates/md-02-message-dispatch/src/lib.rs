//! # Message Dispatch
//!
//! Turns application payloads into delivered, authenticated messages and
//! received envelopes back into application messages.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!  application ──→│ MessageDispatchApi                       │
//!                 │   wrap ─→ id ─→ delivery mode            │
//!                 │        ├─ ReplicatedLog ──→ FlushBatch ──┼──┐ flush worker
//!                 │        └─ Direct ─→ transport selector ←─┼──┘
//!                 │   inbound: decode ─→ decrypt ─→ extract  │
//!                 │            ─→ metadata ─→ application    │
//!                 └───────┬────────────┬─────────────┬───────┘
//!                         ▼            ▼             ▼
//!              EncryptionProtocol  ReplicatedLog  Transport
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Equal (sender, wrapped bytes) give equal ids | `domain/wrapper.rs` - `message_id()` |
//! | Every copy of a group send shares one id | `service/outbound.rs` - `send_group_raw()` |
//! | Payloads at or above the threshold get the lower cost tier | `domain/cost.rs` - `estimate_cost_with()` |
//! | A shared-secret marker always selects the shared-secret path | `domain/routing.rs` - `select_path()` |
//! | Group check-then-add and append are serialized per group | `service/outbound.rs` - `schedule()` |
//! | Bundle advertisement never fails its trigger | `service/recovery.rs` - `advertise_bundle()` |
//! | Only transport decode fails an inbound call | `service/inbound.rs` - `process_incoming_report()` |
//!
//! ## Usage
//!
//! ```rust,ignore
//! let log = Arc::new(DatasyncLog::new(config.datasync_config()));
//! let dispatcher = Arc::new(
//!     MessageDispatcher::new(config, identity, encryption, log, transport)
//!         .with_notifier(Arc::new(BusNotifier::new(bus))),
//! );
//! dispatcher.start()?;
//! let id = dispatcher
//!     .send_private(&SendContext::background(), &peer, RawMessage::new(body, MessageType::ChatMessage))
//!     .await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use adapters::{BusNotifier, DatasyncLog};
pub use config::{ConfigError, DispatchConfig, NetworkConfig};
pub use domain::{
    ApplicationMessage, CancelHandle, DecryptResult, DeliveryMode, DispatchError, DropReason,
    EncryptionError, Identity, InboundReport, MessageSpec, RawMessage, RecoveryOutcome,
    ReplicationError, SendContext, SharedSecret, Stage, StageOutcome, StatusMessage,
    TransportError,
};
pub use ports::inbound::MessageDispatchApi;
pub use ports::outbound::{
    DispatchNotifier, EncryptionProtocol, NoopNotifier, ReplicatedLog, SystemTimeSource,
    TimeSource, Transport,
};
pub use service::MessageDispatcher;
