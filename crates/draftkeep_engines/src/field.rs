#![forbid(unsafe_code)]

use std::fmt;

use draftkeep_kernel_contracts::form::{FieldValidator, FieldValue};
use draftkeep_kernel_contracts::MonotonicTimeNs;

use crate::timer::Debouncer;

/// Receives a field's value once it has settled.
pub trait FieldCommitSink {
    fn commit(&mut self, field: &str, value: FieldValue);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldStoreConfig {
    pub debounce_ms: u64,
}

impl FieldStoreConfig {
    pub fn mvp_v1() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    /// Same value as displayed, or the store was torn down. Nothing happened.
    Unchanged,
    /// Displayed value updated and the commit timer restarted. `error` is the synchronous
    /// per-field validator result.
    Accepted { error: Option<String> },
}

/// Live value of one input. Every keystroke updates the displayed value immediately; the
/// commit sink only sees the value that survives a full quiet period.
pub struct DebouncedField {
    name: String,
    value: FieldValue,
    committed: FieldValue,
    error: Option<String>,
    dirty: bool,
    torn_down: bool,
    timer: Debouncer,
    validator: Option<Box<dyn FieldValidator + Send>>,
}

impl fmt::Debug for DebouncedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedField")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("committed", &self.committed)
            .field("error", &self.error)
            .field("dirty", &self.dirty)
            .field("torn_down", &self.torn_down)
            .field("timer", &self.timer)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl DebouncedField {
    pub fn new(name: impl Into<String>, initial: FieldValue, config: FieldStoreConfig) -> Self {
        Self {
            name: name.into(),
            committed: initial.clone(),
            value: initial,
            error: None,
            dirty: false,
            torn_down: false,
            timer: Debouncer::from_ms(config.debounce_ms),
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn FieldValidator + Send>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_value(&self) -> &FieldValue {
        &self.value
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn handle_change(&mut self, value: FieldValue, now: MonotonicTimeNs) -> FieldChange {
        if self.torn_down {
            tracing::debug!(field = %self.name, "change ignored after teardown");
            return FieldChange::Unchanged;
        }
        if value == self.value {
            return FieldChange::Unchanged;
        }
        self.value = value;
        self.error = self.run_validator();
        self.dirty = self.value != self.committed;
        self.timer.arm(now);
        FieldChange::Accepted {
            error: self.error.clone(),
        }
    }

    /// Commits when the quiet period has elapsed. Returns true when the sink was called.
    pub fn poll(&mut self, now: MonotonicTimeNs, sink: &mut dyn FieldCommitSink) -> bool {
        if self.torn_down || !self.timer.fire_if_due(now) {
            return false;
        }
        self.commit_current(sink);
        true
    }

    /// Sets the value and commits synchronously, cancelling any pending commit.
    pub fn force_update(
        &mut self,
        value: FieldValue,
        sink: &mut dyn FieldCommitSink,
    ) -> Option<String> {
        if self.torn_down {
            tracing::debug!(field = %self.name, "force update ignored after teardown");
            return self.error.clone();
        }
        self.timer.cancel();
        self.value = value;
        self.error = self.run_validator();
        self.commit_current(sink);
        self.error.clone()
    }

    /// Commits a pending value now instead of waiting out the timer.
    pub fn flush(&mut self, sink: &mut dyn FieldCommitSink) -> bool {
        if self.torn_down || !self.timer.cancel() {
            return false;
        }
        self.commit_current(sink);
        true
    }

    /// Adopts a value decided elsewhere (reset, restore) without committing it back.
    pub fn sync_from_form(&mut self, value: FieldValue) {
        self.timer.cancel();
        self.committed = value.clone();
        self.value = value;
        self.error = self.run_validator();
        self.dirty = false;
    }

    /// Drops a pending commit. The store never calls a sink again.
    pub fn teardown(&mut self) {
        if self.timer.cancel() {
            tracing::debug!(field = %self.name, "pending commit dropped on teardown");
        }
        self.torn_down = true;
    }

    fn commit_current(&mut self, sink: &mut dyn FieldCommitSink) {
        sink.commit(&self.name, self.value.clone());
        self.committed = self.value.clone();
        self.dirty = false;
    }

    fn run_validator(&self) -> Option<String> {
        self.validator
            .as_ref()
            .and_then(|v| v.validate_field(&self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Default)]
    struct RecordingSink {
        commits: Vec<(String, FieldValue)>,
    }

    impl FieldCommitSink for RecordingSink {
        fn commit(&mut self, field: &str, value: FieldValue) {
            self.commits.push((field.to_string(), value));
        }
    }

    fn ms(v: u64) -> MonotonicTimeNs {
        MonotonicTimeNs::from_ms(v)
    }

    fn store() -> DebouncedField {
        DebouncedField::new("name", FieldValue::text(""), FieldStoreConfig::mvp_v1())
    }

    fn required(value: &FieldValue) -> Option<String> {
        if value.is_blank() {
            Some("Name is required".to_string())
        } else {
            None
        }
    }

    #[test]
    fn at_field_01_rapid_changes_commit_once_with_last_value() {
        let mut f = store();
        let mut sink = RecordingSink::default();
        for (i, s) in ["A", "Al", "Ali", "Alic", "Alice"].iter().enumerate() {
            f.handle_change(FieldValue::text(*s), ms(i as u64 * 100));
            assert!(!f.poll(ms(i as u64 * 100 + 50), &mut sink));
        }
        assert!(f.is_dirty());
        assert!(f.poll(ms(400 + 300), &mut sink));
        assert!(!f.poll(ms(5_000), &mut sink));
        assert_eq!(
            sink.commits,
            vec![("name".to_string(), FieldValue::text("Alice"))]
        );
        assert!(!f.is_dirty());
    }

    #[test]
    fn at_field_02_same_value_is_noop() {
        let mut f = store();
        assert_eq!(
            f.handle_change(FieldValue::text(""), ms(0)),
            FieldChange::Unchanged
        );
        assert!(!f.is_pending());
    }

    #[test]
    fn at_field_03_validator_result_is_immediate() {
        let mut f = store().with_validator(Box::new(required));
        let out = f.handle_change(FieldValue::text("   "), ms(0));
        assert_eq!(
            out,
            FieldChange::Accepted {
                error: Some("Name is required".to_string())
            }
        );
        assert_eq!(f.error(), Some("Name is required"));
        assert!(f.is_pending());

        f.handle_change(FieldValue::text("Bo"), ms(10));
        assert_eq!(f.error(), None);
    }

    #[test]
    fn at_field_04_force_update_commits_synchronously() {
        let mut f = store();
        let mut sink = RecordingSink::default();
        f.handle_change(FieldValue::text("draft"), ms(0));
        f.force_update(FieldValue::text("final"), &mut sink);

        assert!(!f.is_pending());
        assert!(!f.is_dirty());
        assert_eq!(sink.commits.len(), 1);
        assert_eq!(sink.commits[0].1, FieldValue::text("final"));
        assert!(!f.poll(ms(10_000), &mut sink));
        assert_eq!(sink.commits.len(), 1);
    }

    #[test]
    fn at_field_05_teardown_never_commits() {
        let mut f = store();
        let mut sink = RecordingSink::default();
        f.handle_change(FieldValue::text("half typed"), ms(0));
        f.teardown();
        assert!(!f.poll(ms(10_000), &mut sink));
        assert!(!f.flush(&mut sink));
        assert_eq!(
            f.handle_change(FieldValue::text("more"), ms(20_000)),
            FieldChange::Unchanged
        );
        assert!(sink.commits.is_empty());
    }

    #[test]
    fn at_field_06_flush_only_commits_when_pending() {
        let mut f = store();
        let mut sink = RecordingSink::default();
        assert!(!f.flush(&mut sink));
        f.handle_change(FieldValue::text("x"), ms(0));
        assert!(f.flush(&mut sink));
        assert!(!f.poll(ms(1_000), &mut sink));
        assert_eq!(sink.commits.len(), 1);
    }

    #[test]
    fn at_field_07_typing_back_to_committed_value_is_clean() {
        let mut f = store();
        f.handle_change(FieldValue::text("x"), ms(0));
        assert!(f.is_dirty());
        f.handle_change(FieldValue::text(""), ms(10));
        assert!(!f.is_dirty());
    }

    #[test]
    fn at_field_08_sync_from_form_revalidates_adopted_value() {
        let mut f = store().with_validator(Box::new(required));
        f.handle_change(FieldValue::text("Ann"), ms(0));
        assert_eq!(f.error(), None);

        f.sync_from_form(FieldValue::text(" "));
        assert_eq!(f.error(), Some("Name is required"));
        assert!(!f.is_dirty());
        assert!(!f.is_pending());

        f.sync_from_form(FieldValue::text("Ann"));
        assert_eq!(f.error(), None);
    }

    proptest! {
        #[test]
        fn prop_field_burst_commits_exactly_last_value(
            mut values in proptest::collection::vec("[a-z]{1,6}", 1..20),
            gap_ms in 0u64..300,
        ) {
            values.dedup();
            let mut f = store();
            let mut sink = RecordingSink::default();
            let mut t = 0u64;
            let mut last_change = 0u64;
            for v in &values {
                let out = f.handle_change(FieldValue::text(v.clone()), ms(t));
                prop_assert_ne!(out, FieldChange::Unchanged);
                last_change = t;
                prop_assert!(!f.poll(ms(t), &mut sink));
                t += gap_ms;
            }
            prop_assert!(sink.commits.is_empty());
            prop_assert!(!f.poll(ms(last_change + 299), &mut sink));
            prop_assert!(f.poll(ms(last_change + 300), &mut sink));
            prop_assert_eq!(sink.commits.len(), 1);
            prop_assert_eq!(
                &sink.commits[0].1,
                &FieldValue::text(values.last().unwrap().clone())
            );
        }
    }
}
