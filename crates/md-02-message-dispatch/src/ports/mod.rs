//! Ports: what the dispatcher offers (inbound) and what it needs (outbound).

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
