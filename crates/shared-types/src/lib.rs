//! # Shared Types Crate
//!
//! Value types and network envelopes shared by the message dispatch
//! workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers and keys crossing crate
//!   boundaries are defined here once.
//! - **Compressed keys only**: a `PublicKey` is always the 33-byte SEC1
//!   compressed form.

pub mod entities;
pub mod errors;
pub mod network;

pub use entities::*;
pub use errors::*;
pub use network::*;
