#![forbid(unsafe_code)]

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::form::FormRecord;
use crate::{ContractViolation, Validate};

/// Versioned wrapper written to durable storage. Each persist overwrites the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    pub data: FormRecord,
    /// RFC 3339 (ISO-8601) UTC timestamp of the write.
    pub timestamp: String,
    pub version: String,
}

impl PersistedEnvelope {
    pub fn v1(
        data: FormRecord,
        timestamp: String,
        version: String,
    ) -> Result<Self, ContractViolation> {
        let e = Self {
            data,
            timestamp,
            version,
        };
        e.validate()?;
        Ok(e)
    }

    pub fn matches_version(&self, version: &str) -> bool {
        self.version == version
    }
}

impl Validate for PersistedEnvelope {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_schema_version(&self.version, "persisted_envelope.version")?;
        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(ContractViolation::InvalidValue {
                field: "persisted_envelope.timestamp",
                reason: "must be an RFC 3339 timestamp",
            });
        }
        Ok(())
    }
}

fn validate_schema_version(version: &str, field: &'static str) -> Result<(), ContractViolation> {
    if version.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if version.len() > 32 {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be <= 32 chars",
        });
    }
    if version.chars().any(char::is_whitespace) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain whitespace",
        });
    }
    Ok(())
}

/// `{caller_key}_v{version}`. A new version never sees envelopes written under an old one.
pub fn storage_key(caller_key: &str, version: &str) -> Result<String, ContractViolation> {
    if caller_key.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "storage_key.caller_key",
            reason: "must not be empty",
        });
    }
    if caller_key.len() > 128 {
        return Err(ContractViolation::InvalidValue {
            field: "storage_key.caller_key",
            reason: "must be <= 128 chars",
        });
    }
    validate_schema_version(version, "storage_key.version")?;
    Ok(format!("{caller_key}_v{version}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldValue;

    #[test]
    fn at_persist_01_storage_key_embeds_version() {
        assert_eq!(
            storage_key("attender_application", "1.0").unwrap(),
            "attender_application_v1.0"
        );
        assert!(storage_key("", "1.0").is_err());
        assert!(storage_key("k", " ").is_err());
    }

    #[test]
    fn at_persist_02_envelope_json_shape() {
        let env = PersistedEnvelope::v1(
            FormRecord::from_pairs([("name", FieldValue::text("Alice"))]),
            "2026-10-19T08:00:00+00:00".to_string(),
            "1.0".to_string(),
        )
        .unwrap();
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["timestamp"], "2026-10-19T08:00:00+00:00");
        assert_eq!(json["data"]["name"]["type"], "text");
        assert_eq!(json["data"]["name"]["value"], "Alice");
    }

    #[test]
    fn at_persist_03_envelope_rejects_bad_timestamp() {
        let out = PersistedEnvelope::v1(
            FormRecord::new(),
            "yesterday".to_string(),
            "1.0".to_string(),
        );
        assert!(matches!(
            out,
            Err(ContractViolation::InvalidValue {
                field: "persisted_envelope.timestamp",
                ..
            })
        ));
    }
}
