#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use draftkeep_kernel_contracts::form::{ErrorSet, FieldValue, FormRecord};
use draftkeep_kernel_contracts::progress::{ProgressMode, StepKey, StepStatus};
use draftkeep_kernel_contracts::ContractViolation;

/// Field-specific notion of "filled in".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptinessRule {
    NonBlankText,
    /// Any value other than `Null`. `Bool(false)` counts as answered.
    Defined,
    NonEmptyList,
    FilePresent,
    /// Object value whose listed subfields are all non-blank.
    Subfields(Vec<String>),
    AnyValue,
}

impl EmptinessRule {
    pub fn is_satisfied(&self, value: Option<&FieldValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            EmptinessRule::NonBlankText => value.as_text().is_some_and(|s| !s.trim().is_empty()),
            EmptinessRule::Defined => value.is_defined(),
            EmptinessRule::NonEmptyList => value.as_list().is_some_and(|items| !items.is_empty()),
            EmptinessRule::FilePresent => matches!(value, FieldValue::File(_)),
            EmptinessRule::Subfields(subs) => value.as_object().is_some_and(|m| {
                subs.iter()
                    .all(|sub| m.get(sub.as_str()).is_some_and(|v| !v.is_blank()))
            }),
            EmptinessRule::AnyValue => !value.is_blank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub field: String,
    pub rule: EmptinessRule,
}

impl ChecklistItem {
    pub fn new(field: impl Into<String>, rule: EmptinessRule) -> Self {
        Self {
            field: field.into(),
            rule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefinition {
    pub key: StepKey,
    /// Optional steps only count toward overall progress in `ProgressMode::AllSteps`.
    pub required: bool,
    /// Fields owned by the step. Drives `has_error`; a superset of the checklist fields.
    pub fields: BTreeSet<String>,
    pub checklist: Vec<ChecklistItem>,
}

impl StepDefinition {
    pub fn v1(
        key: &str,
        required: bool,
        checklist: Vec<ChecklistItem>,
    ) -> Result<Self, ContractViolation> {
        let fields = checklist.iter().map(|item| item.field.clone()).collect();
        Ok(Self {
            key: StepKey::new(key)?,
            required,
            fields,
            checklist,
        })
    }

    /// Fields the step owns for error reporting without being part of its checklist.
    pub fn with_extra_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Round-half-up integer percentage. `total == 0` yields 0.
pub fn round_percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let part = part.min(total) as u64;
    let total = total as u64;
    ((part * 100 + total / 2) / total) as u8
}

pub fn compute_step_status(
    step: &StepDefinition,
    values: &FormRecord,
    errors: &ErrorSet,
) -> StepStatus {
    let total = step.checklist.len();
    let satisfied = step
        .checklist
        .iter()
        .filter(|item| item.rule.is_satisfied(values.get(&item.field)))
        .count();
    let has_error = step
        .fields
        .iter()
        .any(|field| errors.has_error_for_field(field));
    StepStatus {
        completed: total > 0 && satisfied == total,
        progress: round_percent(satisfied, total),
        has_error,
    }
}

/// Ordered set of steps making up one multi-step form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCatalog {
    steps: Vec<StepDefinition>,
}

impl StepCatalog {
    pub fn v1(steps: Vec<StepDefinition>) -> Result<Self, ContractViolation> {
        let mut seen = BTreeSet::new();
        for step in &steps {
            if !seen.insert(step.key.clone()) {
                return Err(ContractViolation::InvalidValue {
                    field: "step_catalog.steps.key",
                    reason: "must be unique",
                });
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, key: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.key.as_str() == key)
    }

    pub fn compute_step_status(
        &self,
        key: &str,
        values: &FormRecord,
        errors: &ErrorSet,
    ) -> Result<StepStatus, ContractViolation> {
        let step = self.step(key).ok_or(ContractViolation::InvalidValue {
            field: "step_catalog.step_key",
            reason: "unknown step",
        })?;
        Ok(compute_step_status(step, values, errors))
    }

    pub fn visible_steps(&self, mode: ProgressMode) -> impl Iterator<Item = &StepDefinition> {
        self.steps
            .iter()
            .filter(move |s| mode == ProgressMode::AllSteps || s.required)
    }

    /// Rounded mean of the visible steps' progress. No visible steps yields 0.
    pub fn overall_progress(&self, values: &FormRecord, errors: &ErrorSet, mode: ProgressMode) -> u8 {
        let (sum, count) = self
            .visible_steps(mode)
            .map(|s| compute_step_status(s, values, errors).progress as usize)
            .fold((0usize, 0usize), |(sum, count), p| (sum + p, count + 1));
        if count == 0 {
            return 0;
        }
        ((sum + count / 2) / count) as u8
    }
}
