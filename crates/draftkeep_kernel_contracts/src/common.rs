#![forbid(unsafe_code)]

use std::fmt;

const NS_PER_MS: u64 = 1_000_000;

/// Deterministic clock reading. The host decides what "now" is; engines only compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MonotonicTimeNs(pub u64);

impl MonotonicTimeNs {
    pub fn from_ms(ms: u64) -> Self {
        Self(ms.saturating_mul(NS_PER_MS))
    }

    pub fn saturating_add_ns(self, ns: u64) -> Self {
        Self(self.0.saturating_add(ns))
    }

    pub fn saturating_add_ms(self, ms: u64) -> Self {
        self.saturating_add_ns(ms.saturating_mul(NS_PER_MS))
    }

    pub fn as_ms(self) -> u64 {
        self.0 / NS_PER_MS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    NotFinite {
        field: &'static str,
    },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::InvalidValue { field, reason } => {
                write!(f, "invalid value for {field}: {reason}")
            }
            ContractViolation::InvalidRange {
                field,
                min,
                max,
                got,
            } => write!(f, "{field} out of range [{min}, {max}]: {got}"),
            ContractViolation::NotFinite { field } => write!(f, "{field} must be finite"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}
