//! Snapshot rendering in multiple formats
//!
//! Three report generators are provided, each accessed through a `generate` function:
//! - **Console**: aligned terminal output, optionally colored
//! - **CSV**: the monthly series, one row per month
//! - **JSON**: the full snapshot as machine-readable structured data
//!
//! All generators take the same [`Snapshot`](crate::stats::Snapshot), so callers can emit
//! several formats from one build. Number formatting shared by the generators lives in the
//! `common` module.

mod common;
mod console;
mod csv;
mod json;

pub use console::generate as generate_console;
pub use csv::generate as generate_csv;
pub use json::generate as generate_json;

#[cfg(test)]
pub(crate) fn test_snapshot() -> crate::stats::Snapshot {
    use crate::stats::{Identity, MonthlyCount, assemble, plan_months};
    use chrono::{TimeZone, Utc};

    let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
    let series = plan_months(now)
        .into_iter()
        .map(|window| MonthlyCount::new(window, u64::from(window.month()) * 100, u64::from(window.month())))
        .collect();

    let identity = Identity {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
    };

    assemble(identity, 1234, 56, 3 * 1024 * 1024 * 1024 / 2, series)
}
