#![forbid(unsafe_code)]

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::{AddrParseError, SocketAddr};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use draftkeep_engines::attender::{
    attender_application_initial_record, attender_application_v1,
    attender_application_validator, ATTENDER_APPLICATION_FORM_KEY,
    ATTENDER_APPLICATION_SCHEMA_VERSION,
};
use draftkeep_engines::field::FieldStoreConfig;
use draftkeep_engines::validation::RuleSetValidator;
use draftkeep_kernel_contracts::form::{ErrorSet, FormRecord, InputEvent};
use draftkeep_kernel_contracts::progress::ProgressMode;
use draftkeep_kernel_contracts::{ContractViolation, MonotonicTimeNs};
use draftkeep_os::form::{FormControllerConfig, SubmitOutcome};
use draftkeep_os::persistence::PersistenceConfig;
use draftkeep_os::session::{FormSession, FormSessionConfig, SessionError, TickReport};
use draftkeep_storage::{FileStorage, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8080";
const DEFAULT_TICK_INTERVAL_MS: u64 = 50;
const SUBMISSION_JOURNAL_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid DRAFTKEEP_HTTP_BIND '{value}': {source}")]
    InvalidBind {
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error("submission journal '{path}': {source}")]
    Journal {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode submission: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown progress mode '{0}' (expected required|all)")]
    InvalidProgressMode(String),

    #[error("form session lock poisoned")]
    LockPoisoned,
}

impl AdapterError {
    /// HTTP status the adapter answers with for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            AdapterError::InvalidProgressMode(_)
            | AdapterError::Contract(_)
            | AdapterError::Session(SessionError::Form(_))
            | AdapterError::Session(SessionError::Contract(_)) => 400,
            AdapterError::Session(SessionError::UnknownStep(_)) => 404,
            AdapterError::Session(SessionError::TornDown) => 503,
            _ => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub http_bind: SocketAddr,
    pub storage_dir: PathBuf,
    pub form_key: String,
    pub schema_version: String,
    pub field_debounce_ms: u64,
    pub validation_debounce_ms: u64,
    pub persist_throttle_ms: u64,
    /// 0 disables autosave.
    pub autosave_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub submission_journal: PathBuf,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, AdapterError> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    /// Same as [`AdapterConfig::from_env`] with an injectable lookup. Out-of-range or
    /// unparseable durations fall back to their defaults; a bad bind address is an error.
    pub fn from_env_var_map<F>(mut env_getter: F) -> Result<Self, AdapterError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let bind = non_empty(env_getter("DRAFTKEEP_HTTP_BIND"))
            .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let http_bind = bind
            .parse::<SocketAddr>()
            .map_err(|source| AdapterError::InvalidBind {
                value: bind.clone(),
                source,
            })?;

        let storage_dir = non_empty(env_getter("DRAFTKEEP_STORAGE_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| default_adapter_home().join("drafts"));
        let submission_journal = non_empty(env_getter("DRAFTKEEP_SUBMISSION_JOURNAL"))
            .map(PathBuf::from)
            .unwrap_or_else(|| default_adapter_home().join("submissions.jsonl"));
        let form_key = non_empty(env_getter("DRAFTKEEP_FORM_KEY"))
            .unwrap_or_else(|| ATTENDER_APPLICATION_FORM_KEY.to_string());
        let schema_version = non_empty(env_getter("DRAFTKEEP_SCHEMA_VERSION"))
            .unwrap_or_else(|| ATTENDER_APPLICATION_SCHEMA_VERSION.to_string());

        let field_debounce_ms = parse_ms_from_env(
            &mut env_getter,
            "DRAFTKEEP_FIELD_DEBOUNCE_MS",
            0..=10_000,
            FieldStoreConfig::mvp_v1().debounce_ms,
        );
        let validation_debounce_ms = parse_ms_from_env(
            &mut env_getter,
            "DRAFTKEEP_VALIDATION_DEBOUNCE_MS",
            0..=10_000,
            FormControllerConfig::mvp_v1().validation_debounce_ms,
        );
        let persist_throttle_ms = parse_ms_from_env(
            &mut env_getter,
            "DRAFTKEEP_PERSIST_THROTTLE_MS",
            0..=60_000,
            PersistenceConfig::mvp_v1().throttle_ms,
        );
        let autosave_interval_ms = parse_ms_from_env(
            &mut env_getter,
            "DRAFTKEEP_AUTOSAVE_INTERVAL_MS",
            0..=3_600_000,
            PersistenceConfig::mvp_v1().autosave_interval_ms,
        );
        let tick_interval_ms = parse_ms_from_env(
            &mut env_getter,
            "DRAFTKEEP_TICK_INTERVAL_MS",
            10..=1_000,
            DEFAULT_TICK_INTERVAL_MS,
        );

        Ok(Self {
            http_bind,
            storage_dir,
            form_key,
            schema_version,
            field_debounce_ms,
            validation_debounce_ms,
            persist_throttle_ms,
            autosave_interval_ms,
            tick_interval_ms,
            submission_journal,
        })
    }

    pub fn session_config(&self) -> FormSessionConfig {
        let mut config = FormSessionConfig::mvp_v1(&self.form_key, &self.schema_version);
        config.field = FieldStoreConfig {
            debounce_ms: self.field_debounce_ms,
        };
        config.controller = FormControllerConfig {
            validation_debounce_ms: self.validation_debounce_ms,
        };
        config.persistence = PersistenceConfig {
            throttle_ms: self.persist_throttle_ms,
            autosave_interval_ms: self.autosave_interval_ms,
        };
        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_ms_from_env<F>(
    env_getter: &mut F,
    key: &'static str,
    range: RangeInclusive<u64>,
    default: u64,
) -> u64
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(raw) = non_empty(env_getter(key)) else {
        return default;
    };
    match raw.parse::<u64>() {
        Ok(v) if range.contains(&v) => v,
        _ => {
            tracing::warn!(
                key,
                value = %raw,
                min = *range.start(),
                max = *range.end(),
                default,
                "ignoring out-of-range duration"
            );
            default
        }
    }
}

fn default_adapter_home() -> PathBuf {
    match env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => PathBuf::from(home).join(".draftkeep"),
        _ => PathBuf::from(".draftkeep"),
    }
}

/// Maps the tokio clock onto the session's monotonic nanoseconds.
#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    origin: Instant,
}

impl ProcessClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> MonotonicTimeNs {
        let elapsed = self.origin.elapsed().as_nanos();
        MonotonicTimeNs(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSnapshotResponse {
    pub status: String,
    pub form_key: String,
    pub schema_version: String,
    pub values: FormRecord,
    pub errors: ErrorSet,
    pub is_dirty: bool,
    pub is_submitting: bool,
    pub was_restored: bool,
    pub last_saved_at: Option<String>,
    pub overall_progress: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInputResponse {
    pub status: String,
    pub field: String,
    pub field_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlurRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub outcome: String,
    pub errors: ErrorSet,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepProgressRow {
    pub key: String,
    pub required: bool,
    pub completed: bool,
    pub progress: u8,
    pub has_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub status: String,
    pub mode: ProgressMode,
    pub overall_progress: u8,
    pub steps: Vec<StepProgressRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub form_key: String,
    pub schema_version: String,
    pub last_saved_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterErrorResponse {
    pub status: String,
    pub outcome: String,
    pub reason: String,
}

impl From<&AdapterError> for AdapterErrorResponse {
    fn from(err: &AdapterError) -> Self {
        Self {
            status: "error".to_string(),
            outcome: "REJECTED".to_string(),
            reason: err.to_string(),
        }
    }
}

/// One accepted submission, one JSON line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionJournalEntry {
    pub journal_schema_version: u8,
    pub schema_version: String,
    pub submitted_at: String,
    pub data: FormRecord,
}

type AttenderSession = FormSession<RuleSetValidator, FileStorage>;

#[derive(Debug, Clone)]
pub struct AdapterRuntime {
    session: Arc<Mutex<AttenderSession>>,
    clock: ProcessClock,
    form_key: String,
    schema_version: String,
    journal_path: PathBuf,
    tick_interval: Duration,
}

impl AdapterRuntime {
    pub fn new(config: &AdapterConfig) -> Result<Self, AdapterError> {
        let clock = ProcessClock::start();
        let storage = FileStorage::open(config.storage_dir.clone())?;
        let validator = attender_application_validator();
        let mut session = FormSession::init(
            config.session_config(),
            storage,
            attender_application_initial_record(),
            validator.clone(),
            attender_application_v1()?,
            clock.now(),
        )?;
        for field in validator.fields() {
            if let Some(field_validator) = validator.field_validator(field) {
                session.attach_field_validator(field, Box::new(field_validator))?;
            }
        }
        ensure_journal_ready(&config.submission_journal)?;
        tracing::info!(
            form_key = %config.form_key,
            storage_dir = %config.storage_dir.display(),
            journal = %config.submission_journal.display(),
            "adapter runtime ready"
        );
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            clock,
            form_key: config.form_key.clone(),
            schema_version: config.schema_version.clone(),
            journal_path: config.submission_journal.clone(),
            tick_interval: Duration::from_millis(config.tick_interval_ms),
        })
    }

    pub fn default_from_env() -> Result<Self, AdapterError> {
        Self::new(&AdapterConfig::from_env()?)
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, AttenderSession>, AdapterError> {
        self.session.lock().map_err(|_| AdapterError::LockPoisoned)
    }

    pub fn tick(&self) -> Result<TickReport, AdapterError> {
        let now = self.clock.now();
        Ok(self.lock_session()?.tick(now)?)
    }

    pub fn snapshot(&self) -> Result<FormSnapshotResponse, AdapterError> {
        let session = self.lock_session()?;
        Ok(self.snapshot_of(&session))
    }

    fn snapshot_of(&self, session: &AttenderSession) -> FormSnapshotResponse {
        FormSnapshotResponse {
            status: "ok".to_string(),
            form_key: self.form_key.clone(),
            schema_version: self.schema_version.clone(),
            values: session.values().clone(),
            errors: session.errors().clone(),
            is_dirty: session.controller().is_dirty(),
            is_submitting: session.controller().is_submitting(),
            was_restored: session.persistence().was_restored(),
            last_saved_at: session.persistence().last_saved_at().map(str::to_string),
            overall_progress: session.overall_progress(ProgressMode::RequiredOnly),
        }
    }

    pub fn input(&self, event: InputEvent) -> Result<FieldInputResponse, AdapterError> {
        let now = self.clock.now();
        let field_error = self.lock_session()?.input(&event, now)?;
        Ok(FieldInputResponse {
            status: "ok".to_string(),
            field: event.name().to_string(),
            field_error,
        })
    }

    pub fn set_values(&self, partial: FormRecord) -> Result<FormSnapshotResponse, AdapterError> {
        let now = self.clock.now();
        let mut session = self.lock_session()?;
        session.set_values(&partial, now)?;
        Ok(self.snapshot_of(&session))
    }

    pub fn blur(&self, request: BlurRequest) -> Result<FormSnapshotResponse, AdapterError> {
        let now = self.clock.now();
        let mut session = self.lock_session()?;
        session.blur(&request.name, now)?;
        Ok(self.snapshot_of(&session))
    }

    pub fn reset(&self) -> Result<FormSnapshotResponse, AdapterError> {
        let now = self.clock.now();
        let mut session = self.lock_session()?;
        session.reset(now)?;
        Ok(self.snapshot_of(&session))
    }

    /// Submits the current values. Accepted submissions land in the journal before the
    /// stored draft is cleared.
    pub fn submit(&self) -> Result<SubmitResponse, AdapterError> {
        let now = self.clock.now();
        let mut session = self.lock_session()?;
        let outcome = session.submit(now, |values| self.append_submission(values))?;
        Ok(match outcome {
            SubmitOutcome::Submitted => SubmitResponse {
                status: "ok".to_string(),
                outcome: "SUBMITTED".to_string(),
                errors: ErrorSet::new(),
                reason: None,
            },
            SubmitOutcome::Invalid(errors) => SubmitResponse {
                status: "ok".to_string(),
                outcome: "INVALID".to_string(),
                errors,
                reason: None,
            },
            SubmitOutcome::Failed(err) => SubmitResponse {
                status: "error".to_string(),
                outcome: "FAILED".to_string(),
                errors: ErrorSet::new(),
                reason: Some(err.to_string()),
            },
        })
    }

    pub fn progress(&self, mode: Option<&str>) -> Result<ProgressResponse, AdapterError> {
        let mode = match mode {
            None => ProgressMode::default(),
            Some(raw) => ProgressMode::parse(raw)
                .ok_or_else(|| AdapterError::InvalidProgressMode(raw.to_string()))?,
        };
        let session = self.lock_session()?;
        let mut steps = Vec::new();
        for step in session.catalog().visible_steps(mode) {
            let status = session.step_status(step.key.as_str())?;
            steps.push(StepProgressRow {
                key: step.key.as_str().to_string(),
                required: step.required,
                completed: status.completed,
                progress: status.progress,
                has_error: status.has_error,
            });
        }
        Ok(ProgressResponse {
            status: "ok".to_string(),
            mode,
            overall_progress: session.overall_progress(mode),
            steps,
        })
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        let (outcome, reason, last_saved_at) = match self.lock_session() {
            Ok(session) if session.is_torn_down() => (
                "UNHEALTHY",
                Some("form session torn down".to_string()),
                None,
            ),
            Ok(session) => (
                "HEALTHY",
                None,
                session.persistence().last_saved_at().map(str::to_string),
            ),
            Err(err) => ("UNHEALTHY", Some(err.to_string()), None),
        };
        let status = if reason.is_none() { "ok" } else { "error" };
        AdapterHealthResponse {
            status: status.to_string(),
            outcome: outcome.to_string(),
            reason,
            form_key: self.form_key.clone(),
            schema_version: self.schema_version.clone(),
            last_saved_at,
        }
    }

    /// Unload path: drops pending keystrokes and writes any unsaved committed draft.
    pub fn shutdown(&self) -> Result<(), AdapterError> {
        self.lock_session()?.teardown();
        Ok(())
    }

    fn append_submission(&self, values: &FormRecord) -> Result<(), AdapterError> {
        let entry = SubmissionJournalEntry {
            journal_schema_version: SUBMISSION_JOURNAL_SCHEMA_VERSION,
            schema_version: self.schema_version.clone(),
            submitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data: values.clone(),
        };
        let json = serde_json::to_string(&entry)?;
        let journal_err = |source| AdapterError::Journal {
            path: self.journal_path.display().to_string(),
            source,
        };
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.journal_path)
            .map_err(journal_err)?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_data())
            .map_err(journal_err)?;
        tracing::info!(journal = %self.journal_path.display(), "submission journaled");
        Ok(())
    }
}

fn ensure_journal_ready(path: &Path) -> Result<(), AdapterError> {
    let journal_err = |source| AdapterError::Journal {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(journal_err)?;
    }
    if !path.exists() {
        File::create(path).map_err(journal_err)?;
    }
    Ok(())
}

/// Drives the session timers until the session is torn down.
pub fn spawn_tick_worker(runtime: AdapterRuntime) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(runtime.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match runtime.tick() {
                Ok(report) => {
                    if let Some(trigger) = report.saved {
                        tracing::debug!(?trigger, "draft persisted");
                    }
                }
                Err(AdapterError::Session(SessionError::TornDown)) => {
                    tracing::info!("tick worker stopped after teardown");
                    break;
                }
                Err(err) => tracing::warn!(error = %err, "tick failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftkeep_kernel_contracts::form::FieldValue;
    use std::collections::BTreeMap;
    use std::io::{BufRead, BufReader};

    fn env_map(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn test_config(dir: &Path) -> AdapterConfig {
        AdapterConfig::from_env_var_map(env_map(&[
            ("DRAFTKEEP_STORAGE_DIR", dir.join("drafts").to_str().unwrap()),
            (
                "DRAFTKEEP_SUBMISSION_JOURNAL",
                dir.join("journal/submissions.jsonl").to_str().unwrap(),
            ),
        ]))
        .unwrap()
    }

    fn text(name: &str, value: &str) -> InputEvent {
        InputEvent::Text {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn checkbox(name: &str, checked: bool) -> InputEvent {
        InputEvent::Checkbox {
            name: name.to_string(),
            checked,
        }
    }

    fn numeric(name: &str, value: f64) -> InputEvent {
        InputEvent::Numeric {
            name: name.to_string(),
            value: Some(value),
        }
    }

    fn journal_lines(path: &Path) -> Vec<SubmissionJournalEntry> {
        let file = File::open(path).unwrap();
        BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn at_adapter_01_config_defaults() {
        let c = AdapterConfig::from_env_var_map(|_| None).unwrap();
        assert_eq!(c.http_bind, DEFAULT_HTTP_BIND.parse::<SocketAddr>().unwrap());
        assert_eq!(c.form_key, ATTENDER_APPLICATION_FORM_KEY);
        assert_eq!(c.schema_version, ATTENDER_APPLICATION_SCHEMA_VERSION);
        assert_eq!(c.field_debounce_ms, 300);
        assert_eq!(c.validation_debounce_ms, 500);
        assert_eq!(c.persist_throttle_ms, 1_000);
        assert_eq!(c.autosave_interval_ms, 30_000);
        assert_eq!(c.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
    }

    #[test]
    fn at_adapter_02_config_overrides_and_bounds() {
        let c = AdapterConfig::from_env_var_map(env_map(&[
            ("DRAFTKEEP_HTTP_BIND", "0.0.0.0:9090"),
            ("DRAFTKEEP_FORM_KEY", "guide_signup"),
            ("DRAFTKEEP_SCHEMA_VERSION", "2.1"),
            ("DRAFTKEEP_FIELD_DEBOUNCE_MS", "150"),
            ("DRAFTKEEP_VALIDATION_DEBOUNCE_MS", "not-a-number"),
            ("DRAFTKEEP_PERSIST_THROTTLE_MS", "999999"),
            ("DRAFTKEEP_AUTOSAVE_INTERVAL_MS", "0"),
            ("DRAFTKEEP_TICK_INTERVAL_MS", "1"),
        ]))
        .unwrap();
        assert_eq!(c.http_bind.port(), 9090);
        assert_eq!(c.form_key, "guide_signup");
        assert_eq!(c.schema_version, "2.1");
        assert_eq!(c.field_debounce_ms, 150);
        assert_eq!(c.validation_debounce_ms, 500);
        assert_eq!(c.persist_throttle_ms, 1_000);
        assert_eq!(c.autosave_interval_ms, 0);
        assert_eq!(c.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);

        let s = c.session_config();
        assert_eq!(s.field.debounce_ms, 150);
        assert_eq!(s.persistence.autosave_interval_ms, 0);
        assert_eq!(s.form_key, "guide_signup");
    }

    #[test]
    fn at_adapter_03_bad_bind_is_rejected() {
        let err = AdapterConfig::from_env_var_map(env_map(&[("DRAFTKEEP_HTTP_BIND", "localhost")]))
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidBind { .. }));
    }

    #[test]
    fn at_adapter_04_error_status_codes() {
        assert_eq!(
            AdapterError::InvalidProgressMode("x".to_string()).http_status_code(),
            400
        );
        assert_eq!(
            AdapterError::Session(SessionError::UnknownStep("x".to_string())).http_status_code(),
            404
        );
        assert_eq!(
            AdapterError::Session(SessionError::TornDown).http_status_code(),
            503
        );
        assert_eq!(AdapterError::LockPoisoned.http_status_code(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn at_adapter_05_input_settles_and_persists_draft() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let runtime = AdapterRuntime::new(&config).unwrap();

        let out = runtime.input(text("email", "ana@")).unwrap();
        assert_eq!(out.field_error.as_deref(), Some("Enter a valid email address"));
        runtime.input(text("first_name", "Ana")).unwrap();

        tokio::time::advance(Duration::from_millis(300)).await;
        runtime.tick().unwrap();
        let snap = runtime.snapshot().unwrap();
        assert_eq!(snap.values.get("first_name"), Some(&FieldValue::text("Ana")));
        assert!(snap.is_dirty);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        let report = runtime.tick().unwrap();
        assert!(report.saved.is_some());
        assert!(dir
            .path()
            .join("drafts")
            .join("attender_application_v1.0.json")
            .exists());

        runtime.shutdown().unwrap();
        assert!(matches!(
            runtime.tick(),
            Err(AdapterError::Session(SessionError::TornDown))
        ));
        assert_eq!(runtime.health_report().outcome, "UNHEALTHY");

        let reopened = AdapterRuntime::new(&config).unwrap();
        let snap = reopened.snapshot().unwrap();
        assert!(snap.was_restored);
        assert_eq!(snap.values.get("first_name"), Some(&FieldValue::text("Ana")));
    }

    #[tokio::test(start_paused = true)]
    async fn at_adapter_06_incomplete_submit_is_invalid_and_not_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let runtime = AdapterRuntime::new(&config).unwrap();
        runtime.input(text("first_name", "Ana")).unwrap();

        let out = runtime.submit().unwrap();
        assert_eq!(out.outcome, "INVALID");
        assert!(out.errors.get("email").is_some());
        assert!(out.errors.get("first_name").is_none());
        assert!(journal_lines(&config.submission_journal).is_empty());

        let progress = runtime.progress(Some("all")).unwrap();
        assert_eq!(progress.steps.len(), 6);
        assert!(progress.steps.iter().any(|s| s.key == "personal_info" && s.has_error));
        assert!(matches!(
            runtime.progress(Some("most")),
            Err(AdapterError::InvalidProgressMode(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn at_adapter_07_complete_submit_journals_and_clears_draft() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let runtime = AdapterRuntime::new(&config).unwrap();

        for (name, value) in [
            ("first_name", "Ana"),
            ("last_name", "Silva"),
            ("email", "ana@example.pt"),
            ("phone", "+351 912 345 678"),
            (
                "bio",
                "Born and raised in Porto, I run food walks through Ribeira and Bonfim.",
            ),
        ] {
            runtime.input(text(name, value)).unwrap();
        }
        runtime.input(numeric("years_experience", 6.0)).unwrap();
        runtime.input(numeric("max_group_size", 8.0)).unwrap();
        runtime.input(numeric("hourly_rate", 35.0)).unwrap();
        runtime.input(checkbox("terms_accepted", true)).unwrap();
        runtime.input(checkbox("background_check_consent", true)).unwrap();
        runtime
            .set_values(FormRecord::from_pairs([
                (
                    "location",
                    FieldValue::object([
                        ("city", FieldValue::text("Porto")),
                        ("country", FieldValue::text("Portugal")),
                        ("address", FieldValue::text("Rua das Flores 10")),
                    ]),
                ),
                ("languages", FieldValue::List(vec![FieldValue::text("pt")])),
                ("weekdays", FieldValue::List(vec![FieldValue::text("sat")])),
            ]))
            .unwrap();

        let out = runtime.submit().unwrap();
        assert_eq!(out.outcome, "SUBMITTED", "errors: {:?}", out.errors);
        let lines = journal_lines(&config.submission_journal);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].schema_version, "1.0");
        assert_eq!(lines[0].data.get("last_name"), Some(&FieldValue::text("Silva")));
        assert!(!dir
            .path()
            .join("drafts")
            .join("attender_application_v1.0.json")
            .exists());

        let progress = runtime.progress(None).unwrap();
        assert_eq!(progress.overall_progress, 100);
    }
}
