#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{ContractViolation, Validate};

/// Delimiters that separate a field name from a nested error path (`location.city`, `languages[0]`).
pub const ERROR_KEY_DELIMITERS: &[char] = &['.', '['];

/// Reference to a user-selected file. Content never lives in the form record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl FileRef {
    pub fn v1(
        file_name: String,
        size_bytes: u64,
        mime_type: String,
    ) -> Result<Self, ContractViolation> {
        let f = Self {
            file_name,
            size_bytes,
            mime_type,
        };
        f.validate()?;
        Ok(f)
    }
}

impl Validate for FileRef {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.file_name.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "file_ref.file_name",
                reason: "must not be empty",
            });
        }
        if self.file_name.len() > 255 {
            return Err(ContractViolation::InvalidValue {
                field: "file_ref.file_name",
                reason: "must be <= 255 chars",
            });
        }
        Ok(())
    }
}

/// A single field value. `Null` means "not defined", which is distinct from `Bool(false)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    File(FileRef),
    List(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    pub fn object<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        FieldValue::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_defined(&self) -> bool {
        !matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Generic "has the user provided something" check used when no field-specific rule applies.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Bool(_) | FieldValue::Number(_) | FieldValue::File(_) => false,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Object(map) => map.values().all(FieldValue::is_blank),
        }
    }
}

/// The whole form: field name to value. The key set is fixed by the caller's initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FormRecord(BTreeMap<String, FieldValue>);

impl FormRecord {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(name.into(), value)
    }

    /// Keys of `partial` whose value differs structurally from the current one.
    pub fn changed_fields(&self, partial: &FormRecord) -> Vec<String> {
        partial
            .0
            .iter()
            .filter(|(k, v)| self.0.get(k.as_str()) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Overwrites every key present in `partial`. Callers decide whether keys are allowed.
    pub fn apply(&mut self, partial: &FormRecord) {
        for (k, v) in &partial.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Deterministic serialization (sorted keys) used for deep comparison and storage.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Per-field interaction flags. Created lazily, reset all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldMeta {
    pub touched: bool,
    pub dirty: bool,
}

/// Field name (or nested path) to human-readable message. A missing key means valid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorSet(BTreeMap<String, String>);

impl ErrorSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.0.insert(key.into(), message.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First message that belongs to `field`, including nested keys.
    pub fn first_for_field(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| error_key_belongs_to_field(k, field))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_error_for_field(&self, field: &str) -> bool {
        self.first_for_field(field).is_some()
    }

    /// Replaces only the entries owned by `fields` with the entries `fresh` has for them.
    pub fn merge_for_fields(&mut self, fresh: &ErrorSet, fields: &BTreeSet<String>) {
        self.0.retain(|k, _| {
            !fields
                .iter()
                .any(|field| error_key_belongs_to_field(k, field))
        });
        for (k, v) in &fresh.0 {
            if fields
                .iter()
                .any(|field| error_key_belongs_to_field(k, field))
            {
                self.0.insert(k.clone(), v.clone());
            }
        }
    }

    /// Takes every entry of `fresh`. Entries owned by `changed` that `fresh` no longer
    /// reports are dropped; other existing entries stay.
    pub fn merge_fresh(&mut self, fresh: &ErrorSet, changed: &BTreeSet<String>) {
        self.0.retain(|k, _| {
            fresh.0.contains_key(k)
                || !changed
                    .iter()
                    .any(|field| error_key_belongs_to_field(k, field))
        });
        for (k, v) in &fresh.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

/// `key == field`, or `key` continues `field` with one of [`ERROR_KEY_DELIMITERS`].
pub fn error_key_belongs_to_field(key: &str, field: &str) -> bool {
    match key.strip_prefix(field) {
        Some("") => true,
        Some(rest) => rest.starts_with(ERROR_KEY_DELIMITERS),
        None => false,
    }
}

/// Concrete input kinds the form accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    Text { name: String, value: String },
    Checkbox { name: String, checked: bool },
    Numeric { name: String, value: Option<f64> },
    File { name: String, file: Option<FileRef> },
}

impl InputEvent {
    pub fn name(&self) -> &str {
        match self {
            InputEvent::Text { name, .. }
            | InputEvent::Checkbox { name, .. }
            | InputEvent::Numeric { name, .. }
            | InputEvent::File { name, .. } => name,
        }
    }

    /// Text and numeric input arrive per keystroke; the rest are discrete choices.
    pub fn is_keystroke(&self) -> bool {
        matches!(self, InputEvent::Text { .. } | InputEvent::Numeric { .. })
    }

    pub fn to_value(&self) -> FieldValue {
        match self {
            InputEvent::Text { value, .. } => FieldValue::Text(value.clone()),
            InputEvent::Checkbox { checked, .. } => FieldValue::Bool(*checked),
            InputEvent::Numeric { value, .. } => value.map_or(FieldValue::Null, FieldValue::Number),
            InputEvent::File { file, .. } => {
                file.clone().map_or(FieldValue::Null, FieldValue::File)
            }
        }
    }
}

impl Validate for InputEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.name().trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "input_event.name",
                reason: "must not be empty",
            });
        }
        match self {
            InputEvent::Numeric { value: Some(v), .. } if !v.is_finite() => {
                Err(ContractViolation::NotFinite {
                    field: "input_event.value",
                })
            }
            InputEvent::File { file: Some(f), .. } => f.validate(),
            _ => Ok(()),
        }
    }
}

/// Whole-form validation supplied by the caller. Must be pure and idempotent.
pub trait FormValidator {
    fn validate(&self, values: &FormRecord) -> ErrorSet;
}

impl<F> FormValidator for F
where
    F: Fn(&FormRecord) -> ErrorSet,
{
    fn validate(&self, values: &FormRecord) -> ErrorSet {
        self(values)
    }
}

/// Single-field validation run synchronously on every accepted keystroke.
pub trait FieldValidator {
    fn validate_field(&self, value: &FieldValue) -> Option<String>;
}

impl<F> FieldValidator for F
where
    F: Fn(&FieldValue) -> Option<String>,
{
    fn validate_field(&self, value: &FieldValue) -> Option<String> {
        self(value)
    }
}
