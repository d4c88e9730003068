#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::repo::{validate_key, StorageAdapter, StorageError};

/// In-process storage with the failure modes of browser local storage: a byte quota and an
/// off switch for "storage disabled".
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
    disabled: bool,
    write_count: u64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    fn ensure_enabled(&self) -> Result<(), StorageError> {
        if self.disabled {
            return Err(StorageError::Unavailable {
                reason: "in-memory storage disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl StorageAdapter for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.ensure_enabled()?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_enabled()?;
        validate_key(key)?;
        if let Some(limit) = self.quota_bytes {
            let existing = self.entries.get(key).map_or(0, |v| key.len() + v.len());
            let needed = self.used_bytes() - existing + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        self.write_count = self.write_count.saturating_add(1);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.ensure_enabled()?;
        self.entries.remove(key);
        Ok(())
    }
}
