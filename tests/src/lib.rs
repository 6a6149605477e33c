//! # Message Dispatch Test Suite
//!
//! Multi-node flows over the in-memory network, encryption and the real
//! replicated log.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs        # Node fixture and inbox pumping
//!     ├── datasync_flow.rs  # Replicated-log delivery and session recovery
//!     └── public_chat.rs    # Public topics and bus events
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p md-tests
//! cargo test -p md-tests integration::datasync_flow::
//! ```

#![allow(dead_code)]

pub mod integration;
