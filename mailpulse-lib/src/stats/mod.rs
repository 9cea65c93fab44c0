//! Mailbox statistics collection and caching
//!
//! This module gathers activity counters for a single mailbox from the provider's
//! HTTP APIs and packages them into a [`Snapshot`].
//!
//! # Implementation Model
//!
//! The entry point is [`SnapshotService`], which answers "give me the snapshot for
//! this credential" and owns the caching policy:
//! - **Identity lookup**: the one hard dependency. If it fails there is no snapshot.
//! - **Current month**: received and sent counts since the first of the month.
//! - **Monthly series**: received and sent counts for the trailing twelve months,
//!   planned by [`plan_months`] and fetched in parallel by [`aggregate_monthly`].
//! - **Storage quota**: bytes used, reported in GiB.
//!
//! Every count is best effort. [`count_messages`] walks cursor-based pages and stops
//! early on any failure, returning what it has seen so far. A month task that fails
//! outright contributes zeros. Partial data is never flagged downstream.
//!
//! Snapshots are stored through the [`SnapshotStore`] trait, either in memory for
//! long-running hosts or on disk for repeated CLI invocations. Concurrent misses for
//! the same credential share a single in-flight build.

mod aggregator;
mod client;
mod counter;
mod month_window;
mod progress;
mod service;
mod snapshot;
mod store;
mod throttler;

pub use aggregator::{AggregateSettings, aggregate_monthly};
pub use client::{ApiResult, Client, Endpoints, Identity, MessagePage, MessageRef, Timeouts};
pub use counter::{PagePolicy, count_messages};
pub use month_window::{MONTHS_PER_SERIES, MonthWindow, plan_months};
pub use progress::{MonthTracker, NoProgress, Progress};
pub use service::{ServiceSettings, SnapshotService, cache_key};
pub use snapshot::{MonthlyCount, Snapshot, assemble};
pub use store::{CacheEntry, DiskStore, MemoryStore, SnapshotStore};
pub use throttler::Throttler;
