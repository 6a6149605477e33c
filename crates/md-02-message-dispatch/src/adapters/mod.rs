//! Adapters from the dispatcher's ports to concrete collaborators.

pub mod bus;
pub mod datasync;

pub use bus::BusNotifier;
pub use datasync::DatasyncLog;
