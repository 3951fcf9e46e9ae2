//! Task lifecycle: location-gated status transitions with append-only
//! session accounting.

#![warn(missing_docs)]

pub mod engine;
pub mod sessions;

pub use engine::{TaskEngine, TaskError};
pub use sessions::{accumulated_minutes, begin_session, end_open_session};
