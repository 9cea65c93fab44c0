use super::client::Identity;
use super::month_window::MonthWindow;
use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Received and sent counts for one month of the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    pub month_label: String,
    pub year: i32,
    pub month: u32,
    pub sent: u64,
    pub received: u64,
}

impl MonthlyCount {
    #[must_use]
    pub fn new(window: MonthWindow, received: u64, sent: u64) -> Self {
        Self {
            month_label: window.label(),
            year: window.year(),
            month: window.month(),
            sent,
            received,
        }
    }

    /// The placeholder used when a month could not be counted at all.
    #[must_use]
    pub fn zero(window: MonthWindow) -> Self {
        Self::new(window, 0, 0)
    }

    /// Chronological sort key.
    #[must_use]
    pub const fn sort_key(&self) -> (i32, u32) {
        (self.year, self.month)
    }
}

/// The merged result of one aggregation cycle for a single mailbox.
///
/// Snapshots are immutable once built. A newer snapshot supersedes an older one; nothing
/// updates a snapshot in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub identity_name: String,
    pub identity_email: String,
    pub current_received: u64,
    pub current_sent: u64,
    pub storage_used_gb: f64,
    pub monthly_series: Vec<MonthlyCount>,
}

impl Snapshot {
    /// Sum of received messages across the monthly series.
    #[must_use]
    pub fn series_received(&self) -> u64 {
        self.monthly_series.iter().map(|m| m.received).sum()
    }

    /// Sum of sent messages across the monthly series.
    #[must_use]
    pub fn series_sent(&self) -> u64 {
        self.monthly_series.iter().map(|m| m.sent).sum()
    }
}

/// Merges the pieces of a snapshot build into a [`Snapshot`].
#[must_use]
pub fn assemble(identity: Identity, current_received: u64, current_sent: u64, storage_used_bytes: u64, monthly_series: Vec<MonthlyCount>) -> Snapshot {
    #[expect(clippy::cast_precision_loss, reason = "storage figures are for display only")]
    let storage_used_gb = storage_used_bytes as f64 / BYTES_PER_GIB;

    Snapshot {
        identity_name: identity.name,
        identity_email: identity.email,
        current_received,
        current_sent,
        storage_used_gb,
        monthly_series,
    }
}
