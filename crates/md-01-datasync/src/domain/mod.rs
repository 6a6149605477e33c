//! Pure replicated-log domain: no I/O, no clocks.

pub mod entities;
pub mod errors;
pub mod group;
pub mod state;

pub use entities::*;
pub use errors::*;
pub use group::*;
pub use state::*;
