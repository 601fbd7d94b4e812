use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn};

const LOW_QUOTA_WARNING: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub calls_made: u32,
    pub limit: u32,
    pub last_reset: DateTime<Utc>,
    pub month_year: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub calls_made: u32,
    pub limit: u32,
    pub remaining: u32,
    pub month_year: String,
    pub last_reset: DateTime<Utc>,
}

/// Persistence boundary for the quota counter. `load` returning `Ok(None)`
/// means no usable state (missing or corrupt), which the tracker answers by
/// resetting rather than failing.
pub trait UsageStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<UsageRecord>>;
    fn save(&self, record: &UsageRecord) -> anyhow::Result<()>;
}

pub struct FileUsageStore {
    path: PathBuf,
}

impl FileUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UsageStore for FileUsageStore {
    fn load(&self) -> anyhow::Result<Option<UsageRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Unparseable usage file, counter will reset: {}", e);
                Ok(None)
            }
        }
    }

    fn save(&self, record: &UsageRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write-then-rename so a crash mid-save never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub fn month_label(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Monthly call budget for the primary trivia provider. One instance per
/// process; the mutex serializes every load-modify-save so concurrent callers
/// cannot lose increments.
pub struct UsageTracker {
    store: Box<dyn UsageStore>,
    limit: u32,
    lock: Mutex<()>,
}

impl UsageTracker {
    pub fn new(store: Box<dyn UsageStore>, limit: u32) -> Self {
        Self {
            store,
            limit,
            lock: Mutex::new(()),
        }
    }

    pub fn can_make_call(&self) -> bool {
        self.can_make_call_at(Utc::now())
    }

    pub fn record_call(&self) {
        self.record_call_at(Utc::now())
    }

    pub fn usage_stats(&self) -> UsageStats {
        self.usage_stats_at(Utc::now())
    }

    pub fn force_reset(&self) {
        let _guard = self.lock.lock().expect("usage tracker lock poisoned");
        let record = self.reset(Utc::now());
        info!("API usage manually reset for {}", record.month_year);
    }

    pub(crate) fn can_make_call_at(&self, now: DateTime<Utc>) -> bool {
        let _guard = self.lock.lock().expect("usage tracker lock poisoned");
        let record = self.current(now);
        let remaining = self.limit.saturating_sub(record.calls_made);

        if remaining == 0 {
            info!(
                calls_made = record.calls_made,
                limit = self.limit,
                "Monthly API limit reached, resets on the 1st of next month"
            );
            return false;
        }
        true
    }

    pub(crate) fn record_call_at(&self, now: DateTime<Utc>) {
        let _guard = self.lock.lock().expect("usage tracker lock poisoned");
        let mut record = self.current(now);
        record.calls_made += 1;

        if let Err(e) = self.store.save(&record) {
            error!("Failed to persist API usage: {}", e);
        }

        let remaining = self.limit.saturating_sub(record.calls_made);
        info!(
            calls_made = record.calls_made,
            limit = self.limit,
            remaining,
            "API call recorded"
        );
        if remaining <= LOW_QUOTA_WARNING {
            warn!("Only {} API calls left this month", remaining);
        }
    }

    pub(crate) fn usage_stats_at(&self, now: DateTime<Utc>) -> UsageStats {
        let _guard = self.lock.lock().expect("usage tracker lock poisoned");
        let record = self.current(now);
        UsageStats {
            calls_made: record.calls_made,
            limit: self.limit,
            remaining: self.limit.saturating_sub(record.calls_made),
            month_year: record.month_year,
            last_reset: record.last_reset,
        }
    }

    // Loads persisted state, rolling the counter over when the calendar month
    // has changed since the stored label. Callers must hold the lock.
    fn current(&self, now: DateTime<Utc>) -> UsageRecord {
        match self.store.load() {
            Ok(Some(record)) if record.month_year == month_label(now) => record,
            Ok(Some(stale)) => {
                info!(
                    old = %stale.month_year,
                    new = %month_label(now),
                    "New month detected, resetting API usage counter"
                );
                self.reset(now)
            }
            Ok(None) => self.reset(now),
            Err(e) => {
                error!("Failed to load API usage, treating as fresh month: {}", e);
                self.reset(now)
            }
        }
    }

    fn reset(&self, now: DateTime<Utc>) -> UsageRecord {
        let record = UsageRecord {
            calls_made: 0,
            limit: self.limit,
            last_reset: now,
            month_year: month_label(now),
        };
        if let Err(e) = self.store.save(&record) {
            error!("Failed to persist API usage reset: {}", e);
        }
        record
    }
}
