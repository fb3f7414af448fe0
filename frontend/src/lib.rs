pub mod events;
pub mod persist;
pub mod session;
pub mod telemetry_table;

pub use tracker_shared as shared;
