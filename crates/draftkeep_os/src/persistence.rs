#![forbid(unsafe_code)]

use chrono::{SecondsFormat, Utc};
use draftkeep_engines::timer::{IntervalTimer, Throttle};
use draftkeep_kernel_contracts::form::FormRecord;
use draftkeep_kernel_contracts::persist::{storage_key, PersistedEnvelope};
use draftkeep_kernel_contracts::{ContractViolation, MonotonicTimeNs, Validate};
use draftkeep_storage::{StorageAdapter, StorageError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub throttle_ms: u64,
    /// 0 disables autosave.
    pub autosave_interval_ms: u64,
}

impl PersistenceConfig {
    pub fn mvp_v1() -> Self {
        Self {
            throttle_ms: 1_000,
            autosave_interval_ms: 30_000,
        }
    }
}

/// Source of envelope timestamps.
pub trait WallClock {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_rfc3339(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode draft: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    Throttle,
    Autosave,
    Unload,
    Forced,
}

impl SaveTrigger {
    fn as_str(self) -> &'static str {
        match self {
            SaveTrigger::Throttle => "throttle",
            SaveTrigger::Autosave => "autosave",
            SaveTrigger::Unload => "unload",
            SaveTrigger::Forced => "forced",
        }
    }
}

/// Clears `is_saving` however the write ends.
struct SavingGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> SavingGuard<'a> {
    fn begin(flag: &'a mut bool) -> Self {
        *flag = true;
        Self { flag }
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        *self.flag = false;
    }
}

/// Keeps one form draft in durable storage under a versioned key.
///
/// Storage failures are logged and swallowed on the timer paths; the in-memory value is
/// never touched by a failed write.
pub struct PersistenceAdapter<S> {
    storage: S,
    clock: Box<dyn WallClock + Send>,
    key: String,
    version: String,
    value: FormRecord,
    last_saved_json: Option<String>,
    last_saved_at: Option<String>,
    was_restored: bool,
    is_saving: bool,
    stopped: bool,
    throttle: Throttle,
    autosave: IntervalTimer,
}

impl<S> std::fmt::Debug for PersistenceAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("last_saved_at", &self.last_saved_at)
            .field("was_restored", &self.was_restored)
            .field("is_saving", &self.is_saving)
            .field("stopped", &self.stopped)
            .field("throttle", &self.throttle)
            .field("autosave", &self.autosave)
            .finish()
    }
}

impl<S> PersistenceAdapter<S>
where
    S: StorageAdapter,
{
    /// Reads any stored draft for `(key, version)` and starts autosave. Missing, malformed
    /// or mismatched envelopes fall back to `initial`.
    pub fn open(
        storage: S,
        key: &str,
        version: &str,
        initial: FormRecord,
        config: PersistenceConfig,
        now: MonotonicTimeNs,
    ) -> Result<Self, PersistError> {
        let storage_key = storage_key(key, version)?;
        let mut adapter = Self {
            storage,
            clock: Box::new(SystemWallClock),
            key: storage_key,
            version: version.to_string(),
            value: initial,
            last_saved_json: None,
            last_saved_at: None,
            was_restored: false,
            is_saving: false,
            stopped: false,
            throttle: Throttle::from_ms(config.throttle_ms),
            autosave: IntervalTimer::from_ms(config.autosave_interval_ms),
        };
        if let Some(envelope) = adapter.read_envelope() {
            adapter.last_saved_json = Some(envelope.data.canonical_json()?);
            adapter.last_saved_at = Some(envelope.timestamp);
            adapter.value = envelope.data;
            adapter.was_restored = true;
            tracing::info!(key = %adapter.key, "restored persisted draft");
        }
        adapter.autosave.start(now);
        Ok(adapter)
    }

    pub fn with_clock(mut self, clock: Box<dyn WallClock + Send>) -> Self {
        self.clock = clock;
        self
    }

    fn read_envelope(&self) -> Option<PersistedEnvelope> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "draft read failed; using initial value");
                return None;
            }
        };
        let envelope: PersistedEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "stored draft is malformed; ignoring");
                return None;
            }
        };
        if let Err(err) = envelope.validate() {
            tracing::warn!(key = %self.key, error = %err, "stored draft failed validation; ignoring");
            return None;
        }
        if !envelope.matches_version(&self.version) {
            tracing::warn!(
                key = %self.key,
                stored = %envelope.version,
                expected = %self.version,
                "stored draft version mismatch; ignoring"
            );
            return None;
        }
        Some(envelope)
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &FormRecord {
        &self.value
    }

    pub fn was_restored(&self) -> bool {
        self.was_restored
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn last_saved_at(&self) -> Option<&str> {
        self.last_saved_at.as_deref()
    }

    pub fn is_save_pending(&self) -> bool {
        self.throttle.is_pending()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// True when the current value differs from the last successful write.
    pub fn has_unsaved_changes(&self) -> bool {
        match (self.value.canonical_json(), &self.last_saved_json) {
            (Ok(current), Some(saved)) => &current != saved,
            (Ok(_), None) => true,
            (Err(_), _) => true,
        }
    }

    /// Adopts a new value and schedules a throttled save. Returns true when a save is
    /// (still) scheduled.
    pub fn update_value(&mut self, value: FormRecord, now: MonotonicTimeNs) -> bool {
        if self.stopped {
            return false;
        }
        self.value = value;
        if !self.has_unsaved_changes() {
            self.throttle.cancel();
            return false;
        }
        self.throttle.arm(now);
        true
    }

    /// Writes the current value right away, bypassing the throttle.
    pub fn force_save(&mut self) -> Result<(), PersistError> {
        self.throttle.cancel();
        self.write(SaveTrigger::Forced)
    }

    /// Removes the stored draft. The current value becomes the saved baseline so autosave
    /// does not write the draft straight back.
    pub fn clear_storage(&mut self) -> Result<(), PersistError> {
        self.throttle.cancel();
        self.storage.remove(&self.key)?;
        self.last_saved_json = Some(self.value.canonical_json()?);
        self.last_saved_at = None;
        tracing::info!(key = %self.key, "persisted draft cleared");
        Ok(())
    }

    pub fn tick(&mut self, now: MonotonicTimeNs) -> Option<SaveTrigger> {
        self.tick_with_hold(now, false)
    }

    /// Runs due timers. While `hold` is true a due throttle or autosave is deferred to the
    /// next unheld tick instead of writing.
    pub fn tick_with_hold(&mut self, now: MonotonicTimeNs, hold: bool) -> Option<SaveTrigger> {
        if self.stopped || hold {
            return None;
        }
        let trigger = if self.throttle.fire_if_due(now) {
            // A later autosave period would find nothing new.
            self.autosave.fire_if_due(now);
            SaveTrigger::Throttle
        } else if self.autosave.fire_if_due(now) {
            SaveTrigger::Autosave
        } else {
            return None;
        };
        if !self.has_unsaved_changes() {
            return None;
        }
        match self.write(trigger) {
            Ok(()) => Some(trigger),
            Err(err) => {
                tracing::warn!(key = %self.key, trigger = trigger.as_str(), error = %err, "draft save failed");
                None
            }
        }
    }

    /// Flushes a pending throttled save. Returns true when a write succeeded.
    pub fn on_unload(&mut self) -> bool {
        if self.stopped || !self.throttle.cancel() {
            return false;
        }
        match self.write(SaveTrigger::Unload) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "draft save on unload failed");
                false
            }
        }
    }

    /// Cancels every timer. Later ticks and unload calls are no-ops.
    pub fn stop(&mut self) {
        self.throttle.cancel();
        self.autosave.stop();
        self.stopped = true;
    }

    fn write(&mut self, trigger: SaveTrigger) -> Result<(), PersistError> {
        let timestamp = self.clock.now_rfc3339();
        let envelope =
            PersistedEnvelope::v1(self.value.clone(), timestamp.clone(), self.version.clone())?;
        let encoded = serde_json::to_string(&envelope)?;
        let saved_json = self.value.canonical_json()?;

        let _saving = SavingGuard::begin(&mut self.is_saving);
        self.storage.set(&self.key, &encoded)?;
        self.last_saved_json = Some(saved_json);
        self.last_saved_at = Some(timestamp);
        tracing::debug!(key = %self.key, trigger = trigger.as_str(), bytes = encoded.len(), "draft saved");
        Ok(())
    }
}
