//! Cross-crate integration flows.

pub mod harness;

#[cfg(test)]
mod datasync_flow;
#[cfg(test)]
mod public_chat;
