use super::aggregator::{AggregateSettings, aggregate_monthly};
use super::client::Client;
use super::counter::{PagePolicy, count_messages};
use super::month_window::{MonthWindow, plan_months};
use super::progress::{MonthTracker, NoProgress, Progress};
use super::snapshot::{Snapshot, assemble};
use super::store::{CacheEntry, SnapshotStore};
use super::throttler::Throttler;
use chrono::{DateTime, TimeDelta, Utc};
use core::time::Duration;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared, WeakShared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

const LOG_TARGET: &str = "   service";

/// Number of leading credential characters that identify a cache entry.
const CACHE_KEY_CHARS: usize = 20;

/// Number of leading credential characters that may appear in logs.
const REDACTED_CHARS: usize = 6;

type BuildFuture = BoxFuture<'static, Option<Arc<Snapshot>>>;
type Build = Shared<BuildFuture>;

/// Tunables for snapshot builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// How long a stored snapshot is served before it is rebuilt.
    pub ttl: Duration,

    /// Paging policy for the current-month totals.
    pub current_month_policy: PagePolicy,

    /// Paging policy for each month of the series.
    pub monthly_policy: PagePolicy,

    /// Maximum number of month tasks counted at once.
    pub worker_width: usize,

    /// Upper bound on a single month task.
    pub month_task_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            current_month_policy: PagePolicy::CURRENT_MONTH,
            monthly_policy: PagePolicy::MONTHLY,
            worker_width: 12,
            month_task_timeout: Duration::from_secs(120),
        }
    }
}

/// Builds mailbox snapshots and keeps them for a while.
///
/// Cloning is cheap and clones share the store and the set of in-flight builds.
#[derive(Debug, Clone)]
pub struct SnapshotService {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    store: Arc<dyn SnapshotStore>,
    settings: ServiceSettings,
    progress: Arc<dyn Progress>,
    in_flight: Mutex<HashMap<String, WeakShared<BuildFuture>>>,
}

impl core::fmt::Debug for Inner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inner")
            .field("client", &self.client)
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SnapshotService {
    #[must_use]
    pub fn new(client: Client, store: Arc<dyn SnapshotStore>, settings: ServiceSettings) -> Self {
        Self::with_progress(client, store, settings, Arc::new(NoProgress))
    }

    /// Like [`SnapshotService::new`], reporting build phases and month progress to `progress`.
    #[must_use]
    pub fn with_progress(client: Client, store: Arc<dyn SnapshotStore>, settings: ServiceSettings, progress: Arc<dyn Progress>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                settings,
                progress,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> ServiceSettings {
        self.inner.settings
    }

    /// Return the snapshot for `credential`, building it if there is no fresh one.
    ///
    /// Returns `None` when the identity lookup fails. Nothing is stored in that case, so the
    /// next call tries again.
    pub async fn get_or_build(&self, credential: &str) -> Option<Arc<Snapshot>> {
        self.get_or_build_at(credential, Utc::now()).await
    }

    /// [`SnapshotService::get_or_build`] with an explicit notion of the current time.
    ///
    /// `now` decides freshness and anchors the monthly series. A newly built snapshot is
    /// stamped with `now` plus however long the build took, so its lifetime starts when it
    /// is stored rather than when it was requested.
    ///
    /// Concurrent calls for the same credential share one build. The build lives only as long
    /// as at least one caller is waiting on it; once every caller has dropped its future the
    /// build is cancelled and the next call starts over.
    pub async fn get_or_build_at(&self, credential: &str, now: DateTime<Utc>) -> Option<Arc<Snapshot>> {
        let key = cache_key(credential);

        if let Some(entry) = self.inner.store.get(&key) {
            if entry.is_fresh(now, self.inner.settings.ttl) {
                log::debug!(target: LOG_TARGET, "Serving cached snapshot for {} built at {}", redacted(credential), entry.created_at);
                return Some(entry.snapshot);
            }
            log::debug!(target: LOG_TARGET, "Cached snapshot for {} from {} has expired", redacted(credential), entry.created_at);
        }

        let build = self.join_or_start(&key, credential, now);
        let result = build.clone().await;

        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(&key)
            .is_some_and(|weak| weak.upgrade().is_none_or(|current| current.ptr_eq(&build)))
        {
            let _ = in_flight.remove(&key);
        }

        result
    }

    fn join_or_start(&self, key: &str, credential: &str, now: DateTime<Utc>) -> Build {
        let mut in_flight = self.inner.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        // A build that has already failed its identity lookup is not joined; the caller
        // gets a fresh attempt instead of the stale `None`.
        if let Some(existing) = in_flight
            .get(key)
            .and_then(WeakShared::upgrade)
            .filter(|build| !matches!(build.peek(), Some(None)))
        {
            log::debug!(target: LOG_TARGET, "Joining in-flight build for {}", redacted(credential));
            return existing;
        }

        let inner = Arc::clone(&self.inner);
        let key_owned = key.to_string();
        let credential = credential.to_string();
        let build = async move { inner.build(&key_owned, &credential, now).await }.boxed().shared();

        if let Some(weak) = build.downgrade() {
            let _ = in_flight.insert(key.to_string(), weak);
        }

        build
    }
}

impl Inner {
    async fn build(&self, key: &str, credential: &str, now: DateTime<Utc>) -> Option<Arc<Snapshot>> {
        let started = Instant::now();
        let who = redacted(credential);
        log::info!(target: LOG_TARGET, "Building snapshot for {who}");

        self.progress.set_phase("Identifying");
        let identity = match self.client.identity(credential).await {
            Ok(identity) => identity,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Identity lookup failed for {who}: {e:#}");
                return None;
            }
        };

        self.progress.set_phase("Counting");
        let current = MonthWindow::containing(now);
        let received_query = current.received_to_date_query();
        let sent_query = current.sent_to_date_query();
        let windows = plan_months(now);
        let throttler = Throttler::new(self.settings.worker_width);
        let tracker = MonthTracker::attach(self.progress.as_ref());
        let month_settings = AggregateSettings {
            policy: self.settings.monthly_policy,
            task_timeout: self.settings.month_task_timeout,
        };

        let (storage_used_bytes, current_received, current_sent, series) = tokio::join!(
            self.storage_used_bytes(credential),
            count_messages(&self.client, credential, &received_query, self.settings.current_month_policy, &throttler),
            count_messages(&self.client, credential, &sent_query, self.settings.current_month_policy, &throttler),
            aggregate_monthly(&self.client, credential, &windows, month_settings, &throttler, &tracker),
        );

        let snapshot = Arc::new(assemble(identity, current_received, current_sent, storage_used_bytes, series));
        let created_at = now + TimeDelta::from_std(started.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.store.put(key, CacheEntry::new(Arc::clone(&snapshot), created_at));

        log::info!(
            target: LOG_TARGET,
            "Built snapshot for {who}: {current_received} received and {current_sent} sent this month, {} months in series",
            snapshot.monthly_series.len()
        );

        Some(snapshot)
    }

    async fn storage_used_bytes(&self, credential: &str) -> u64 {
        match self.client.storage_used_bytes(credential).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not read storage quota, reporting 0: {e:#}");
                0
            }
        }
    }
}

/// The cache key for `credential`: its first 20 characters.
///
/// Two credentials sharing a 20-character prefix share a cache entry.
#[must_use]
pub fn cache_key(credential: &str) -> String {
    credential.chars().take(CACHE_KEY_CHARS).collect()
}

fn redacted(credential: &str) -> String {
    let prefix: String = credential.chars().take(REDACTED_CHARS).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::client::{Endpoints, Timeouts};
    use crate::stats::store::MemoryStore;

    #[test]
    fn test_cache_key_takes_prefix() {
        assert_eq!(cache_key("ya29.a0AfH6SMBxyz0123456789abcdef"), "ya29.a0AfH6SMBxyz012");
        assert_eq!(cache_key("short"), "short");
        assert_eq!(cache_key(""), "");
    }

    #[test]
    fn test_cache_key_respects_char_boundaries() {
        let credential = "é".repeat(30);
        assert_eq!(cache_key(&credential).chars().count(), 20);
    }

    #[test]
    fn test_shared_prefix_shares_key() {
        assert_eq!(cache_key("0123456789abcdefghijAAAA"), cache_key("0123456789abcdefghijBBBB"));
    }

    #[test]
    fn test_redacted_hides_most_of_credential() {
        assert_eq!(redacted("ya29.a0AfH6SMBx"), "ya29.a...");
    }

    #[tokio::test]
    async fn test_failed_build_is_not_joined() {
        let client = Client::new(Endpoints::with_base("http://127.0.0.1:9"), Timeouts::default()).unwrap();
        let service = SnapshotService::new(client, Arc::new(MemoryStore::new()), ServiceSettings::default());
        let key = cache_key("ya29.a0AfH6SMBx");

        let failed: Build = async { None }.boxed().shared();
        assert!(failed.clone().await.is_none());
        let _ = service
            .inner
            .in_flight
            .lock()
            .unwrap()
            .insert(key.clone(), failed.downgrade().unwrap());

        let build = service.join_or_start(&key, "ya29.a0AfH6SMBx", Utc::now());
        assert!(!build.ptr_eq(&failed));
        assert!(build.peek().is_none());
    }

    #[tokio::test]
    async fn test_running_build_is_joined() {
        let client = Client::new(Endpoints::with_base("http://127.0.0.1:9"), Timeouts::default()).unwrap();
        let service = SnapshotService::new(client, Arc::new(MemoryStore::new()), ServiceSettings::default());
        let key = cache_key("ya29.a0AfH6SMBx");

        let running: Build = futures_util::future::pending().boxed().shared();
        let _ = service
            .inner
            .in_flight
            .lock()
            .unwrap()
            .insert(key.clone(), running.downgrade().unwrap());

        let build = service.join_or_start(&key, "ya29.a0AfH6SMBx", Utc::now());
        assert!(build.ptr_eq(&running));
    }

    #[test]
    fn test_default_settings() {
        let settings = ServiceSettings::default();
        assert_eq!(settings.ttl, Duration::from_secs(300));
        assert_eq!(settings.worker_width, 12);
        assert_eq!(settings.monthly_policy.max_pages, 3);
        assert_eq!(settings.current_month_policy.max_pages, 5);
    }
}
