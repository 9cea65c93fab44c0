use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of months covered by a monthly series.
pub const MONTHS_PER_SERIES: usize = 12;

/// Fixed step used to walk backwards through the series.
///
/// This is an approximation of "one calendar month": stepping back by multiples of 30 days
/// from the first of a month can land in the same month twice and skip another.
const STEP_DAYS: i64 = 30;

/// A calendar month in UTC.
///
/// Field order matters: the derived ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthWindow {
    year: i32,
    month: u32,
}

impl MonthWindow {
    /// Returns `None` if `month` is not in `1..=12` or the year is out of range.
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// The month containing `instant`.
    #[must_use]
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// First instant of the month (00:00:00 on day 1).
    #[must_use]
    pub fn start(self) -> DateTime<Utc> {
        first_day(self.year, self.month).and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Last second of the month (23:59:59 on its final day).
    #[must_use]
    pub fn end(self) -> DateTime<Utc> {
        let (next_year, next_month) = if self.month == 12 { (self.year + 1, 1) } else { (self.year, self.month + 1) };
        first_day(next_year, next_month).and_time(chrono::NaiveTime::MIN).and_utc() - Duration::seconds(1)
    }

    /// Display label such as `Mar 2025`.
    #[must_use]
    pub fn label(self) -> String {
        self.start().format("%b %Y").to_string()
    }

    /// Provider search predicate for messages received during this month.
    #[must_use]
    pub fn received_query(self) -> String {
        format!("in:inbox after:{} before:{}", self.start().timestamp(), self.end().timestamp())
    }

    /// Provider search predicate for messages sent during this month.
    #[must_use]
    pub fn sent_query(self) -> String {
        format!("in:sent after:{} before:{}", self.start().timestamp(), self.end().timestamp())
    }

    /// Messages received since the month started, with no upper bound.
    #[must_use]
    pub fn received_to_date_query(self) -> String {
        format!("in:inbox after:{}", self.start().timestamp())
    }

    /// Messages sent since the month started, with no upper bound.
    #[must_use]
    pub fn sent_to_date_query(self) -> String {
        format!("in:sent after:{}", self.start().timestamp())
    }
}

impl core::fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn first_day(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("month windows are validated on construction")
}

/// Plans the trailing monthly series ending with the month that contains `now`, oldest first.
///
/// Starting from the first day of the current month, this steps back `i * 30` days for each of
/// the [`MONTHS_PER_SERIES`] slots and takes the month of the resulting instant. The result always
/// has exactly [`MONTHS_PER_SERIES`] entries in non-decreasing order, but because of the fixed step
/// a month may appear twice while its neighbour is missing.
#[must_use]
pub fn plan_months(now: DateTime<Utc>) -> Vec<MonthWindow> {
    let anchor = MonthWindow::containing(now).start();

    let mut windows: Vec<_> = (0_i64..)
        .take(MONTHS_PER_SERIES)
        .map(|i| MonthWindow::containing(anchor - Duration::days(i * STEP_DAYS)))
        .collect();

    windows.reverse();
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 13, 45, 10).unwrap()
    }

    fn pairs(windows: &[MonthWindow]) -> Vec<(i32, u32)> {
        windows.iter().map(|w| (w.year(), w.month())).collect()
    }

    #[test]
    fn test_new_rejects_invalid_month() {
        assert!(MonthWindow::new(2025, 0).is_none());
        assert!(MonthWindow::new(2025, 13).is_none());
        assert!(MonthWindow::new(2025, 12).is_some());
    }

    #[test]
    fn test_bounds_cover_whole_month() {
        let jan = MonthWindow::new(2025, 1).unwrap();
        assert_eq!(jan.start(), Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(jan.end(), Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap());

        let dec = MonthWindow::new(2024, 12).unwrap();
        assert_eq!(dec.end(), Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap());

        let leap_feb = MonthWindow::new(2024, 2).unwrap();
        assert_eq!(leap_feb.end(), Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
    }

    #[test]
    fn test_label() {
        assert_eq!(MonthWindow::new(2025, 3).unwrap().label(), "Mar 2025");
        assert_eq!(MonthWindow::new(2024, 12).unwrap().label(), "Dec 2024");
    }

    #[test]
    fn test_queries_use_unix_bounds() {
        let jan = MonthWindow::new(2025, 1).unwrap();
        assert_eq!(jan.received_query(), "in:inbox after:1735689600 before:1738367999");
        assert_eq!(jan.sent_query(), "in:sent after:1735689600 before:1738367999");
        assert_eq!(jan.received_to_date_query(), "in:inbox after:1735689600");
        assert_eq!(jan.sent_to_date_query(), "in:sent after:1735689600");
    }

    #[test]
    fn test_ordering_is_chronological() {
        let a = MonthWindow::new(2024, 12).unwrap();
        let b = MonthWindow::new(2025, 1).unwrap();
        let c = MonthWindow::new(2025, 2).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_plan_mid_year() {
        let plan = plan_months(utc(2025, 6, 15));
        assert_eq!(
            pairs(&plan),
            vec![
                (2024, 7),
                (2024, 8),
                (2024, 9),
                (2024, 10),
                (2024, 11),
                (2024, 12),
                (2025, 1),
                (2025, 2),
                (2025, 3),
                (2025, 4),
                (2025, 5),
                (2025, 6),
            ]
        );
    }

    #[test]
    fn test_plan_reproduces_thirty_day_drift() {
        // From 1 March the fixed step lands on 30 Jan, 31 Dec, and 1 Dec: February is skipped
        // and December appears twice.
        let plan = pairs(&plan_months(utc(2025, 3, 1)));
        assert_eq!(plan.len(), MONTHS_PER_SERIES);
        assert_eq!(&plan[8..], &[(2024, 12), (2024, 12), (2025, 1), (2025, 3)]);
        assert!(!plan.contains(&(2025, 2)));
    }

    #[test]
    fn test_plan_properties_hold_for_every_month() {
        for year in [2023, 2024, 2025] {
            for month in 1..=12 {
                for day in [1, 15, 28] {
                    let now = utc(year, month, day);
                    let plan = plan_months(now);

                    assert_eq!(plan.len(), MONTHS_PER_SERIES);
                    assert!(plan.windows(2).all(|w| w[0] <= w[1]), "not sorted for {now}");
                    assert_eq!(plan.last().copied(), Some(MonthWindow::containing(now)));
                }
            }
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let now = utc(2025, 10, 3);
        assert_eq!(plan_months(now), plan_months(now));
    }
}
