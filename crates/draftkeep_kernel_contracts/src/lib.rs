#![forbid(unsafe_code)]

pub mod common;
pub mod form;
pub mod persist;
pub mod progress;

pub use common::{ContractViolation, MonotonicTimeNs, Validate};
