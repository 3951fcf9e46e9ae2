//! Background jobs: entry-triggered auto-assignment and the daily
//! carryover run.

#![warn(missing_docs)]

pub mod assign;
pub mod carryover;

pub use assign::{AssignConfig, AutoAssignEngine};
pub use carryover::{CarryoverConfig, CarryoverReport, CarryoverScheduler};
