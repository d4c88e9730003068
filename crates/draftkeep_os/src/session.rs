#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use draftkeep_engines::field::{DebouncedField, FieldChange, FieldCommitSink, FieldStoreConfig};
use draftkeep_engines::progress::{compute_step_status, StepCatalog};
use draftkeep_kernel_contracts::form::{
    ErrorSet, FieldMeta, FieldValidator, FieldValue, FormRecord, FormValidator, InputEvent,
};
use draftkeep_kernel_contracts::progress::{ProgressMode, StepStatus};
use draftkeep_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};
use draftkeep_storage::StorageAdapter;
use thiserror::Error;

use crate::form::{FormController, FormControllerConfig, FormError, SubmitOutcome};
use crate::persistence::{PersistError, PersistenceAdapter, PersistenceConfig, SaveTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSessionConfig {
    pub form_key: String,
    pub schema_version: String,
    pub field: FieldStoreConfig,
    pub controller: FormControllerConfig,
    pub persistence: PersistenceConfig,
    /// Hold throttled and periodic saves while a validation debounce is pending.
    pub defer_persist_while_validating: bool,
    pub clear_draft_on_submit: bool,
}

impl FormSessionConfig {
    pub fn mvp_v1(form_key: impl Into<String>, schema_version: impl Into<String>) -> Self {
        Self {
            form_key: form_key.into(),
            schema_version: schema_version.into(),
            field: FieldStoreConfig::mvp_v1(),
            controller: FormControllerConfig::mvp_v1(),
            persistence: PersistenceConfig::mvp_v1(),
            defer_persist_while_validating: true,
            clear_draft_on_submit: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("form session has been torn down")]
    TornDown,

    #[error(transparent)]
    Form(#[from] FormError),

    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("unknown step '{0}'")]
    UnknownStep(String),
}

/// What one `tick` did. Mostly useful to hosts that log or test timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub committed_fields: usize,
    pub validated: bool,
    pub saved: Option<SaveTrigger>,
}

/// Routes settled field values into the controller.
struct ControllerSink<'a, V> {
    controller: &'a mut FormController<V>,
    now: MonotonicTimeNs,
    changed: bool,
}

impl<V: FormValidator> FieldCommitSink for ControllerSink<'_, V> {
    fn commit(&mut self, field: &str, value: FieldValue) {
        match self.controller.set_field(field, value, self.now) {
            Ok(changed) => self.changed |= changed,
            Err(err) => tracing::warn!(field, error = %err, "field commit rejected"),
        }
    }
}

/// One open form: its controller, a debounced store per field, the draft persistence and
/// the step catalog used for progress.
pub struct FormSession<V, S> {
    config: FormSessionConfig,
    controller: FormController<V>,
    fields: BTreeMap<String, DebouncedField>,
    persistence: PersistenceAdapter<S>,
    catalog: StepCatalog,
    values_changed: bool,
    last_now: MonotonicTimeNs,
    torn_down: bool,
}

impl<V, S> fmt::Debug for FormSession<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormSession")
            .field("form_key", &self.config.form_key)
            .field("schema_version", &self.config.schema_version)
            .field("fields", &self.fields.len())
            .field("persistence", &self.persistence)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl<V, S> FormSession<V, S>
where
    V: FormValidator,
    S: StorageAdapter,
{
    pub fn init(
        config: FormSessionConfig,
        storage: S,
        initial: FormRecord,
        validator: V,
        catalog: StepCatalog,
        now: MonotonicTimeNs,
    ) -> Result<Self, SessionError> {
        let persistence = PersistenceAdapter::open(
            storage,
            &config.form_key,
            &config.schema_version,
            initial.clone(),
            config.persistence,
            now,
        )?;
        let mut controller = FormController::new(config.controller, initial, validator);
        if persistence.was_restored() {
            controller.restore(persistence.value());
        }
        let fields: BTreeMap<String, DebouncedField> = controller
            .values()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    DebouncedField::new(name, value.clone(), config.field),
                )
            })
            .collect();
        tracing::info!(
            form_key = %config.form_key,
            schema_version = %config.schema_version,
            restored = persistence.was_restored(),
            "form session opened"
        );
        Ok(Self {
            config,
            controller,
            fields,
            persistence,
            catalog,
            values_changed: false,
            last_now: now,
            torn_down: false,
        })
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.torn_down {
            return Err(SessionError::TornDown);
        }
        Ok(())
    }

    /// Installs a synchronous per-keystroke validator on one field.
    pub fn attach_field_validator(
        &mut self,
        name: &str,
        validator: Box<dyn FieldValidator + Send>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let field = self.fields.remove(name).ok_or_else(|| {
            SessionError::from(FormError::UnknownField(name.to_string()))
        })?;
        self.fields
            .insert(name.to_string(), field.with_validator(validator));
        Ok(())
    }

    /// Returns the field's immediate validation result.
    pub fn input(
        &mut self,
        event: &InputEvent,
        now: MonotonicTimeNs,
    ) -> Result<Option<String>, SessionError> {
        self.ensure_open()?;
        event.validate()?;
        self.last_now = now;
        let keystroke = event.is_keystroke();
        let value = event.to_value();
        let field = self
            .fields
            .get_mut(event.name())
            .ok_or_else(|| FormError::UnknownField(event.name().to_string()))?;
        if keystroke {
            return Ok(match field.handle_change(value, now) {
                FieldChange::Accepted { error } => error,
                FieldChange::Unchanged => field.error().map(str::to_string),
            });
        }
        let mut sink = ControllerSink {
            controller: &mut self.controller,
            now,
            changed: false,
        };
        let error = field.force_update(value, &mut sink);
        self.values_changed |= sink.changed;
        Ok(error)
    }

    /// Merges structured values (objects, lists) that do not arrive as single input events.
    /// The affected field stores adopt the merged values without committing them back.
    pub fn set_values(
        &mut self,
        partial: &FormRecord,
        now: MonotonicTimeNs,
    ) -> Result<bool, SessionError> {
        self.ensure_open()?;
        self.last_now = now;
        let changed = self.controller.set_fields(partial, now)?;
        if !changed {
            return Ok(false);
        }
        for (name, value) in partial.iter() {
            if let Some(field) = self.fields.get_mut(name) {
                field.sync_from_form(value.clone());
            }
        }
        self.values_changed = true;
        Ok(true)
    }

    /// Flushes the field's pending value so blur validation sees what the user typed.
    pub fn blur(&mut self, name: &str, now: MonotonicTimeNs) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.last_now = now;
        if !self.fields.contains_key(name) {
            return Err(FormError::UnknownField(name.to_string()).into());
        }
        self.flush_field(name, now);
        self.controller.handle_blur(name)?;
        Ok(())
    }

    fn flush_field(&mut self, name: &str, now: MonotonicTimeNs) {
        let Some(field) = self.fields.get_mut(name) else {
            return;
        };
        let mut sink = ControllerSink {
            controller: &mut self.controller,
            now,
            changed: false,
        };
        field.flush(&mut sink);
        self.values_changed |= sink.changed;
    }

    fn flush_all_fields(&mut self, now: MonotonicTimeNs) {
        let mut sink = ControllerSink {
            controller: &mut self.controller,
            now,
            changed: false,
        };
        for field in self.fields.values_mut() {
            field.flush(&mut sink);
        }
        self.values_changed |= sink.changed;
    }

    /// Drives every timer once: field commits, then the validation debounce, then the
    /// persistence observer and its timers.
    pub fn tick(&mut self, now: MonotonicTimeNs) -> Result<TickReport, SessionError> {
        self.ensure_open()?;
        self.last_now = now;
        let mut report = TickReport::default();

        let mut sink = ControllerSink {
            controller: &mut self.controller,
            now,
            changed: false,
        };
        for field in self.fields.values_mut() {
            if field.poll(now, &mut sink) {
                report.committed_fields += 1;
            }
        }
        self.values_changed |= sink.changed;

        report.validated = self.controller.tick(now);

        if std::mem::take(&mut self.values_changed) {
            self.persistence
                .update_value(self.controller.values().clone(), now);
        }
        let hold = self.config.defer_persist_while_validating
            && self.controller.is_validation_pending();
        report.saved = self.persistence.tick_with_hold(now, hold);
        Ok(report)
    }

    pub fn values(&self) -> &FormRecord {
        self.controller.values()
    }

    pub fn errors(&self) -> &ErrorSet {
        self.controller.errors()
    }

    pub fn meta(&self, name: &str) -> Option<FieldMeta> {
        self.controller.meta(name)
    }

    pub fn field(&self, name: &str) -> Option<&DebouncedField> {
        self.fields.get(name)
    }

    pub fn controller(&self) -> &FormController<V> {
        &self.controller
    }

    pub fn persistence(&self) -> &PersistenceAdapter<S> {
        &self.persistence
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn step_status(&self, key: &str) -> Result<StepStatus, SessionError> {
        let step = self
            .catalog
            .step(key)
            .ok_or_else(|| SessionError::UnknownStep(key.to_string()))?;
        Ok(compute_step_status(
            step,
            self.controller.values(),
            self.controller.errors(),
        ))
    }

    pub fn overall_progress(&self, mode: ProgressMode) -> u8 {
        self.catalog
            .overall_progress(self.controller.values(), self.controller.errors(), mode)
    }

    /// Flushes pending keystrokes, then submits. A successful submit clears the stored draft
    /// when configured to.
    pub fn submit<F, E>(
        &mut self,
        now: MonotonicTimeNs,
        on_submit: F,
    ) -> Result<SubmitOutcome<E>, SessionError>
    where
        F: FnOnce(&FormRecord) -> Result<(), E>,
        E: fmt::Display,
    {
        self.ensure_open()?;
        self.last_now = now;
        self.flush_all_fields(now);
        let outcome = self.controller.submit_form(on_submit);
        if outcome.is_submitted() && self.config.clear_draft_on_submit {
            self.persistence
                .update_value(self.controller.values().clone(), now);
            self.values_changed = false;
            if let Err(err) = self.persistence.clear_storage() {
                tracing::warn!(error = %err, "submitted draft could not be cleared");
            }
        }
        Ok(outcome)
    }

    /// Back to the initial record. The reset value replaces the stored draft on the next
    /// save.
    pub fn reset(&mut self, now: MonotonicTimeNs) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.last_now = now;
        self.controller.reset_form();
        for (name, field) in self.fields.iter_mut() {
            let value = self
                .controller
                .values()
                .get(name)
                .cloned()
                .unwrap_or_default();
            field.sync_from_form(value);
        }
        self.persistence
            .update_value(self.controller.values().clone(), now);
        self.values_changed = false;
        Ok(())
    }

    /// Flushes pending keystrokes and writes the draft now.
    pub fn force_save(&mut self, now: MonotonicTimeNs) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.last_now = now;
        self.flush_all_fields(now);
        self.persistence
            .update_value(self.controller.values().clone(), now);
        self.values_changed = false;
        self.persistence.force_save()?;
        Ok(())
    }

    /// Unmount. Pending keystrokes are dropped; committed but unsaved values are written.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        for field in self.fields.values_mut() {
            field.teardown();
        }
        self.persistence
            .update_value(self.controller.values().clone(), self.last_now);
        self.persistence.on_unload();
        self.persistence.stop();
        self.torn_down = true;
        tracing::info!(form_key = %self.config.form_key, "form session torn down");
    }

    pub fn into_storage(self) -> S {
        self.persistence.into_storage()
    }
}
