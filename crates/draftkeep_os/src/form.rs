#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;

use draftkeep_engines::timer::Debouncer;
use draftkeep_kernel_contracts::form::{
    ErrorSet, FieldMeta, FieldValue, FormRecord, FormValidator, InputEvent,
};
use draftkeep_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormControllerConfig {
    pub validation_debounce_ms: u64,
}

impl FormControllerConfig {
    pub fn mvp_v1() -> Self {
        Self {
            validation_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

/// Result of a submit attempt. `Failed` carries the caller's own error back for display.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome<E> {
    Submitted,
    Invalid(ErrorSet),
    Failed(E),
}

impl<E> SubmitOutcome<E> {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted)
    }
}

/// Owner of the form record. Everything else sees it through `&FormRecord` or a clone.
///
/// Callers must disable their submit trigger while [`FormController::is_submitting`] is true;
/// a second submit is not rejected here.
#[derive(Debug, Clone)]
pub struct FormController<V> {
    validator: V,
    initial: FormRecord,
    values: FormRecord,
    /// Last externally committed record: the initial value, a restored draft, or the
    /// last successful submit. Per-field `dirty` compares against it.
    committed: FormRecord,
    meta: BTreeMap<String, FieldMeta>,
    errors: ErrorSet,
    is_dirty: bool,
    is_submitting: bool,
    validation_timer: Debouncer,
    pending_validation: BTreeSet<String>,
}

/// Clears `is_submitting` on every exit path, including unwinding and dropped futures.
struct SubmitGuard<'a, V> {
    form: &'a mut FormController<V>,
}

impl<'a, V> SubmitGuard<'a, V> {
    fn begin(form: &'a mut FormController<V>) -> Self {
        if form.is_submitting {
            tracing::debug!("submit started while a previous submit is still running");
        }
        form.is_submitting = true;
        Self { form }
    }
}

impl<V> Drop for SubmitGuard<'_, V> {
    fn drop(&mut self) {
        self.form.is_submitting = false;
    }
}

impl<V> FormController<V>
where
    V: FormValidator,
{
    pub fn new(config: FormControllerConfig, initial: FormRecord, validator: V) -> Self {
        Self {
            validator,
            values: initial.clone(),
            committed: initial.clone(),
            initial,
            meta: BTreeMap::new(),
            errors: ErrorSet::new(),
            is_dirty: false,
            is_submitting: false,
            validation_timer: Debouncer::from_ms(config.validation_debounce_ms),
            pending_validation: BTreeSet::new(),
        }
    }

    pub fn values(&self) -> &FormRecord {
        &self.values
    }

    pub fn initial_values(&self) -> &FormRecord {
        &self.initial
    }

    pub fn errors(&self) -> &ErrorSet {
        &self.errors
    }

    /// `None` until the field has been interacted with.
    pub fn meta(&self, name: &str) -> Option<FieldMeta> {
        self.meta.get(name).copied()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub fn is_validation_pending(&self) -> bool {
        self.validation_timer.is_pending()
    }

    pub fn set_field(
        &mut self,
        name: &str,
        value: FieldValue,
        now: MonotonicTimeNs,
    ) -> Result<bool, FormError> {
        self.set_fields(&FormRecord::from_pairs([(name, value)]), now)
    }

    /// Merges `partial` into the record. Returns false, touching nothing, when every value
    /// is structurally equal to the current one.
    pub fn set_fields(
        &mut self,
        partial: &FormRecord,
        now: MonotonicTimeNs,
    ) -> Result<bool, FormError> {
        if let Some(unknown) = partial
            .field_names()
            .find(|name| !self.initial.contains_field(name))
        {
            return Err(FormError::UnknownField(unknown.to_string()));
        }
        let changed = self.values.changed_fields(partial);
        if changed.is_empty() {
            return Ok(false);
        }
        self.values.apply(partial);
        for name in changed {
            let dirty = self.values.get(&name) != self.committed.get(&name);
            self.meta.entry(name.clone()).or_default().dirty = dirty;
            self.pending_validation.insert(name);
        }
        self.is_dirty = true;
        self.validation_timer.arm(now);
        Ok(true)
    }

    pub fn handle_change(
        &mut self,
        event: &InputEvent,
        now: MonotonicTimeNs,
    ) -> Result<bool, FormError> {
        event.validate()?;
        self.set_field(event.name(), event.to_value(), now)
    }

    /// Marks the field touched and refreshes its error entry right away.
    pub fn handle_blur(&mut self, name: &str) -> Result<(), FormError> {
        if !self.initial.contains_field(name) {
            return Err(FormError::UnknownField(name.to_string()));
        }
        self.meta.entry(name.to_string()).or_default().touched = true;
        let fresh = self.validator.validate(&self.values);
        self.errors
            .merge_for_fields(&fresh, &BTreeSet::from([name.to_string()]));
        Ok(())
    }

    /// Runs the debounced validation when due and merges the whole result into the error
    /// set. Entries of fields changed since the last run clear when no longer reported.
    pub fn tick(&mut self, now: MonotonicTimeNs) -> bool {
        if !self.validation_timer.fire_if_due(now) {
            return false;
        }
        let fields = std::mem::take(&mut self.pending_validation);
        let fresh = self.validator.validate(&self.values);
        self.errors.merge_fresh(&fresh, &fields);
        tracing::trace!(
            fields = fields.len(),
            errors = self.errors.len(),
            "debounced validation merged"
        );
        true
    }

    /// Full-form validation. Replaces the error set and supersedes any pending debounce.
    pub fn validate_all(&mut self) -> ErrorSet {
        self.validation_timer.cancel();
        self.pending_validation.clear();
        self.errors = self.validator.validate(&self.values);
        self.errors.clone()
    }

    pub fn reset_form(&mut self) {
        self.values = self.initial.clone();
        self.committed = self.initial.clone();
        self.meta.clear();
        self.errors = ErrorSet::new();
        self.is_dirty = false;
        self.validation_timer.cancel();
        self.pending_validation.clear();
    }

    /// Adopts a previously persisted draft as the current, non-dirty state. Keys the form
    /// does not know are dropped; keys the draft lacks keep their initial value.
    pub fn restore(&mut self, draft: &FormRecord) {
        let mut values = self.initial.clone();
        for (name, value) in draft.iter() {
            if self.initial.contains_field(name) {
                values.insert(name, value.clone());
            } else {
                tracing::warn!(field = %name, "dropping unknown field from restored draft");
            }
        }
        self.committed = values.clone();
        self.values = values;
        self.meta.clear();
        self.errors = ErrorSet::new();
        self.is_dirty = false;
        self.validation_timer.cancel();
        self.pending_validation.clear();
    }

    fn commit_current_values(&mut self) {
        self.committed = self.values.clone();
        for meta in self.meta.values_mut() {
            meta.dirty = false;
        }
        self.is_dirty = false;
    }

    fn mark_all_touched(&mut self) {
        for name in self.initial.field_names() {
            self.meta.entry(name.to_string()).or_default().touched = true;
        }
    }

    /// Touches every field, validates in full and calls `on_submit` only on a clean result.
    pub fn submit_form<F, E>(&mut self, on_submit: F) -> SubmitOutcome<E>
    where
        F: FnOnce(&FormRecord) -> Result<(), E>,
        E: fmt::Display,
    {
        let guard = SubmitGuard::begin(self);
        guard.form.mark_all_touched();
        let errors = guard.form.validate_all();
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "submit blocked by validation");
            return SubmitOutcome::Invalid(errors);
        }
        match on_submit(&guard.form.values) {
            Ok(()) => {
                guard.form.commit_current_values();
                SubmitOutcome::Submitted
            }
            Err(err) => {
                tracing::warn!(error = %err, "submit callback failed");
                SubmitOutcome::Failed(err)
            }
        }
    }

    pub async fn submit_form_async<F, Fut, E>(&mut self, on_submit: F) -> SubmitOutcome<E>
    where
        F: FnOnce(FormRecord) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let guard = SubmitGuard::begin(self);
        guard.form.mark_all_touched();
        let errors = guard.form.validate_all();
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "submit blocked by validation");
            return SubmitOutcome::Invalid(errors);
        }
        match on_submit(guard.form.values.clone()).await {
            Ok(()) => {
                guard.form.commit_current_values();
                SubmitOutcome::Submitted
            }
            Err(err) => {
                tracing::warn!(error = %err, "submit callback failed");
                SubmitOutcome::Failed(err)
            }
        }
    }
}
