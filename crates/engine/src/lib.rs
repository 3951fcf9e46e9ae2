//! Service façade wiring the location, attendance, task, and assignment
//! engines behind one boundary API.

#![warn(missing_docs)]

pub mod service;

pub use service::{
    CheckResult, FieldService, FieldServiceConfig, LocationUpdate, Result, ServiceError,
    Violation, WorkerStatus,
};
