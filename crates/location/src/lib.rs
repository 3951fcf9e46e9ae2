//! Location ingestion: the active-region cache and per-user membership
//! tracking that turn raw samples into enter/exit transitions.

#![warn(missing_docs)]

pub mod registry;
pub mod tracker;

pub use registry::{GeofenceRegistry, RegistryConfig};
pub use tracker::{MembershipTracker, SampleOutcome, TrackerConfig};
