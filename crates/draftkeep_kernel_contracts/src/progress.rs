#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(String);

impl StepKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ContractViolation> {
        let k = Self(key.into());
        k.validate()?;
        Ok(k)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for StepKey {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.0.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "step_key",
                reason: "must not be empty",
            });
        }
        if self.0.len() > 64 {
            return Err(ContractViolation::InvalidValue {
                field: "step_key",
                reason: "must be <= 64 chars",
            });
        }
        Ok(())
    }
}

/// Pure projection of one step. Recomputed on every query, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepStatus {
    pub completed: bool,
    /// 0..=100
    pub progress: u8,
    pub has_error: bool,
}

impl Validate for StepStatus {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.progress > 100 {
            return Err(ContractViolation::InvalidRange {
                field: "step_status.progress",
                min: 0.0,
                max: 100.0,
                got: f64::from(self.progress),
            });
        }
        if self.completed && self.progress != 100 {
            return Err(ContractViolation::InvalidValue {
                field: "step_status.completed",
                reason: "completed steps must report progress=100",
            });
        }
        Ok(())
    }
}

/// Which steps count toward overall progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMode {
    #[default]
    RequiredOnly,
    AllSteps,
}

impl ProgressMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" | "required_only" => Some(ProgressMode::RequiredOnly),
            "all" | "all_steps" => Some(ProgressMode::AllSteps),
            _ => None,
        }
    }
}
