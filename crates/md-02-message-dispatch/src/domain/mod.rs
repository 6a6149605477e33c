//! Pure dispatch domain: wrapping, identifiers, cost tiers, path selection
//! and the inbound stage types. No I/O.

pub mod application;
pub mod context;
pub mod cost;
pub mod entities;
pub mod errors;
pub mod pipeline;
pub mod routing;
pub mod wrapper;

pub use application::{decode, encode, encode_membership_update, ApplicationMessage};
pub use context::{CancelHandle, SendContext};
pub use cost::*;
pub use entities::*;
pub use errors::*;
pub use pipeline::*;
pub use routing::*;
pub use wrapper::*;
