#![forbid(unsafe_code)]

pub mod form;
pub mod persistence;
pub mod session;
