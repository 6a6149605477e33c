//! # Replicated Delivery Log
//!
//! In-memory replicated log used by the dispatcher for at-least-once
//! delivery to peers that may be offline.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | Group membership only grows | `domain/state.rs` - `add_peer()` never removes |
//! | A late member is owed the group's history | `domain/state.rs` - `add_peer()` |
//! | Every received message is acked, duplicates included | `domain/state.rs` - `handle()` |
//! | A message surfaces to the application once | `domain/state.rs` - `seen` set |
//! | Batches stay within the byte budget unless a single message exceeds it | `domain/state.rs` - `pack()` |
//!
//! ## Retransmission
//!
//! ```text
//! append ──→ [DUE] ──flush──→ [IN FLIGHT] ──ack──→ [DELIVERED]
//!              ↑                   │
//!              └── base·2^(n-1) ───┘  (given up after max attempts)
//! ```
//!
//! ## Flush Boundary
//!
//! The log never calls back into its owner. Each tick it encodes the due
//! batches and sends them as `FlushBatch` values over the channel handed to
//! `DataSyncNode::init`; the owner consumes them on its own worker.

pub mod codec;
pub mod config;
pub mod domain;
pub mod node;

pub use codec::{decode_payload, encode_payload, PAYLOAD_MAGIC};
pub use config::{batch_budget, DatasyncConfig};
pub use domain::*;
pub use node::DataSyncNode;
