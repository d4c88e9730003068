#![forbid(unsafe_code)]

pub mod attender;
pub mod field;
pub mod progress;
pub mod timer;
pub mod validation;
