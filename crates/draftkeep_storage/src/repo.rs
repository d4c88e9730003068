#![forbid(unsafe_code)]

use thiserror::Error;

/// Failures a storage backend can report. Callers treat all of them as non-fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("storage quota exceeded writing '{key}' ({needed} bytes > {limit} bytes)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("storage io failure on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Minimal key/value surface the persistence layer needs from durable local storage.
pub trait StorageAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: StorageAdapter + ?Sized> StorageAdapter for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "must not be empty",
        });
    }
    if key.len() > 200 {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "must be <= 200 chars",
        });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "must be ascii alphanumeric, '_', '-' or '.'",
        });
    }
    if key.starts_with('.') {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "must not start with '.'",
        });
    }
    Ok(())
}
