#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use draftkeep_kernel_contracts::form::{
    ErrorSet, FieldValidator, FieldValue, FormRecord, FormValidator,
};

static MISSING: FieldValue = FieldValue::Null;

/// Per-field predicate. Format rules (`MinLength`, `Email`, `Phone`) skip blank values so
/// that "missing" is reported by `Required` alone.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Email,
    Phone { min_digits: usize },
    MustBeTrue,
    /// Every listed subfield of an object value must be non-blank. Errors are keyed `field.sub`.
    RequiredSubfields(Vec<String>),
    MinItems(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleOutcome {
    Pass,
    Fail,
    FailSubfields(Vec<String>),
}

impl FieldRule {
    fn check(&self, value: Option<&FieldValue>) -> RuleOutcome {
        let value = value.unwrap_or(&MISSING);
        let pass = match self {
            FieldRule::Required => !value.is_blank(),
            FieldRule::MinLength(n) => match value.as_text() {
                Some(s) if !s.trim().is_empty() => s.trim().chars().count() >= *n,
                _ => true,
            },
            FieldRule::MaxLength(n) => match value.as_text() {
                Some(s) => s.chars().count() <= *n,
                None => true,
            },
            FieldRule::Email => match value.as_text() {
                Some(s) if !s.trim().is_empty() => looks_like_email(s.trim()),
                _ => true,
            },
            FieldRule::Phone { min_digits } => match value.as_text() {
                Some(s) if !s.trim().is_empty() => looks_like_phone(s, *min_digits),
                _ => true,
            },
            FieldRule::MustBeTrue => value.as_bool() == Some(true),
            FieldRule::RequiredSubfields(subs) => {
                let missing: Vec<String> = subs
                    .iter()
                    .filter(|sub| {
                        value
                            .as_object()
                            .and_then(|m| m.get(sub.as_str()))
                            .map_or(true, FieldValue::is_blank)
                    })
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    return RuleOutcome::Pass;
                }
                return RuleOutcome::FailSubfields(missing);
            }
            FieldRule::MinItems(n) => value.as_list().map_or(*n == 0, |items| items.len() >= *n),
        };
        if pass {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Fail
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

fn looks_like_phone(s: &str, min_digits: usize) -> bool {
    let allowed = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    allowed && s.chars().filter(char::is_ascii_digit).count() >= min_digits
}

type RuleList = Vec<(FieldRule, String)>;

/// Validator built from ordered per-field rules. The first failing rule of a field wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSetValidator {
    rules: BTreeMap<String, RuleList>,
}

impl RuleSetValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(
        mut self,
        field: impl Into<String>,
        rule: FieldRule,
        message: impl Into<String>,
    ) -> Self {
        self.rules
            .entry(field.into())
            .or_default()
            .push((rule, message.into()));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Single-field view for synchronous per-keystroke checks.
    pub fn field_validator(&self, field: &str) -> Option<FieldRulesValidator> {
        self.rules.get(field).map(|rules| FieldRulesValidator {
            field: field.to_string(),
            rules: rules.clone(),
        })
    }
}

fn check_field(field: &str, rules: &RuleList, value: Option<&FieldValue>, out: &mut ErrorSet) {
    for (rule, message) in rules {
        match rule.check(value) {
            RuleOutcome::Pass => continue,
            RuleOutcome::Fail => {
                out.insert(field, message.as_str());
            }
            RuleOutcome::FailSubfields(subs) => {
                for sub in subs {
                    out.insert(format!("{field}.{sub}"), message.as_str());
                }
            }
        }
        return;
    }
}

impl FormValidator for RuleSetValidator {
    fn validate(&self, values: &FormRecord) -> ErrorSet {
        let mut errors = ErrorSet::new();
        for (field, rules) in &self.rules {
            check_field(field, rules, values.get(field), &mut errors);
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRulesValidator {
    field: String,
    rules: RuleList,
}

impl FieldValidator for FieldRulesValidator {
    fn validate_field(&self, value: &FieldValue) -> Option<String> {
        let mut errors = ErrorSet::new();
        check_field(&self.field, &self.rules, Some(value), &mut errors);
        errors.first_for_field(&self.field).map(str::to_string)
    }
}
