//! Storage backends for built snapshots.
//!
//! A store only remembers entries. Deciding whether an entry is still fresh is the job of
//! the caller, through [`CacheEntry::is_fresh`].

use super::snapshot::Snapshot;
use crate::Result;
use chrono::{DateTime, Utc};
use core::time::Duration;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

const LOG_TARGET: &str = "     store";

/// A snapshot together with the moment it was built.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub snapshot: Arc<Snapshot>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub const fn new(snapshot: Arc<Snapshot>, created_at: DateTime<Utc>) -> Self {
        Self { snapshot, created_at }
    }

    /// Whether the entry is younger than `ttl` at `now`.
    ///
    /// An entry stamped in the future (clock skew) counts as fresh.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.created_at);
        if age.num_milliseconds() < 0 {
            log::debug!(target: LOG_TARGET, "Entry timestamp is in the future (clock skew detected), treating as fresh");
            return true;
        }

        age.to_std().unwrap_or(Duration::MAX) < ttl
    }
}

/// Somewhere to keep snapshots between requests.
///
/// Implementations are shared between tasks and must tolerate concurrent access. Entries are
/// replaced wholesale by [`SnapshotStore::put`]; there is no eviction.
pub trait SnapshotStore: Send + Sync + core::fmt::Debug {
    /// Look up the entry stored under `key`, fresh or not.
    fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store `entry` under `key`, replacing whatever was there.
    fn put(&self, key: &str, entry: CacheEntry);
}

/// Process-wide in-memory store.
///
/// Unbounded. Stale entries stay until they are overwritten.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn put(&self, key: &str, entry: CacheEntry) {
        let _ = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }
}

/// On-disk representation of a stored snapshot.
#[derive(Debug, Deserialize, Serialize)]
struct Envelope<T> {
    timestamp: DateTime<Utc>,
    payload: T,
}

/// Directory-backed store that keeps one JSON file per key.
///
/// Lets repeated command-line runs share a snapshot. Unreadable or corrupt files are
/// treated as misses, and write failures are logged and otherwise ignored, so the store
/// never turns a successful build into an error.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
    ignore_reads: bool,
}

impl DiskStore {
    /// Create a store rooted at `dir`.
    ///
    /// With `ignore_reads` set every lookup misses, but new snapshots are still written.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ignore_reads: bool) -> Self {
        Self {
            dir: dir.into(),
            ignore_reads,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path_for(key);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Store miss for '{}': {e:#}", path.display());
                return None;
            }
        };

        let envelope: Envelope<Snapshot> = match serde_json::from_reader(BufReader::new(file)) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Ignoring unreadable store file '{}': {e:#}", path.display());
                return None;
            }
        };

        Some(CacheEntry::new(Arc::new(envelope.payload), envelope.timestamp))
    }

    fn save(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir).into_app_err_with(|| format!("creating directory '{}'", self.dir.display()))?;

        let path = self.path_for(key);
        let envelope = Envelope {
            timestamp: entry.created_at,
            payload: entry.snapshot.as_ref(),
        };

        let file = File::create(&path).into_app_err_with(|| format!("creating store file '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);

        #[cfg(debug_assertions)]
        let result = serde_json::to_writer_pretty(&mut writer, &envelope);
        #[cfg(not(debug_assertions))]
        let result = serde_json::to_writer(&mut writer, &envelope);

        result.into_app_err_with(|| format!("writing store file '{}'", path.display()))?;
        writer
            .flush()
            .into_app_err_with(|| format!("flushing store file '{}'", path.display()))?;
        Ok(())
    }
}

impl SnapshotStore for DiskStore {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        if self.ignore_reads {
            return None;
        }
        self.load(key)
    }

    fn put(&self, key: &str, entry: CacheEntry) {
        if let Err(e) = self.save(key, &entry) {
            log::warn!(target: LOG_TARGET, "Could not persist snapshot: {e:#}");
        }
    }
}

/// Map a cache key onto a file name that is safe on every platform.
///
/// Keys are credential prefixes, so only their SHA-256 digest ever reaches the disk.
fn file_stem(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::stats::month_window::plan_months;
    use crate::stats::snapshot::MonthlyCount;
    use chrono::TimeZone;

    fn sample_snapshot() -> Snapshot {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        Snapshot {
            identity_name: "Ada".to_string(),
            identity_email: "ada@example.com".to_string(),
            current_received: 42,
            current_sent: 7,
            storage_used_gb: 1.5,
            monthly_series: plan_months(now).into_iter().map(|w| MonthlyCount::new(w, 10, 2)).collect(),
        }
    }

    fn entry_at(created_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(Arc::new(sample_snapshot()), created_at)
    }

    #[test]
    fn test_freshness_boundary() {
        let created = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let entry = entry_at(created);
        let ttl = Duration::from_secs(300);

        assert!(entry.is_fresh(created, ttl));
        assert!(entry.is_fresh(created + chrono::Duration::seconds(299), ttl));
        assert!(!entry.is_fresh(created + chrono::Duration::seconds(300), ttl));
        assert!(!entry.is_fresh(created + chrono::Duration::days(1), ttl));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let entry = entry_at(now + chrono::Duration::hours(1));
        assert!(entry.is_fresh(now, Duration::from_secs(300)));
    }

    #[test]
    fn test_memory_store_replaces_wholesale() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert!(store.get("key").is_none());

        let first = entry_at(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        store.put("key", first);

        let mut replacement = sample_snapshot();
        replacement.current_sent = 99;
        let second = CacheEntry::new(Arc::new(replacement), Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
        store.put("key", second.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key"), Some(second));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_disk_store_persists_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = entry_at(Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap());

        DiskStore::new(tmp.path(), false).put("ya29.a0AfH6SMBx", entry.clone());

        // A fresh instance sees what the first one wrote.
        let loaded = DiskStore::new(tmp.path(), false).get("ya29.a0AfH6SMBx").unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_disk_store_ignore_reads_still_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = entry_at(Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap());

        let store = DiskStore::new(tmp.path(), true);
        store.put("key", entry);
        assert!(store.get("key").is_none());

        assert!(DiskStore::new(tmp.path(), false).get("key").is_some());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_disk_store_corrupt_file_is_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DiskStore::new(tmp.path(), false);
        fs::write(store.path_for("key"), "not valid json").unwrap();

        assert!(store.get("key").is_none());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_disk_store_write_failure_is_swallowed() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let store = DiskStore::new(&blocker, false);
        store.put("key", entry_at(Utc::now()));
        assert!(store.get("key").is_none());
    }

    #[test]
    fn test_file_stem_is_a_digest() {
        let stem = file_stem("ya29.a0AfH6SMBx/+=");
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, file_stem("ya29.a0AfH6SMBx/+="));
        assert_ne!(stem, file_stem("ya29.a0AfH6SMBx/+-"));
        assert_eq!(file_stem(""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_disk_store_keeps_credentials_out_of_file_names() {
        let tmp = tempfile::tempdir().unwrap();
        let key = "ya29.a0AfH6SMBxsecret";
        DiskStore::new(tmp.path(), false).put(key, entry_at(Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()));

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].contains("ya29"));
        assert!(!names[0].contains("SMBx"));
        assert_eq!(names[0], format!("{}.json", file_stem(key)));
    }
}
