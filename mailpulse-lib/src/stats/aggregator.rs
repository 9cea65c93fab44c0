use super::client::Client;
use super::counter::{PagePolicy, count_messages};
use super::month_window::MonthWindow;
use super::progress::MonthTracker;
use super::snapshot::MonthlyCount;
use super::throttler::Throttler;
use core::panic::AssertUnwindSafe;
use core::time::Duration;
use futures_util::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;

const LOG_TARGET: &str = "aggregator";

/// Knobs for the monthly fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSettings {
    /// Paging policy applied to each received/sent count.
    pub policy: PagePolicy,

    /// Upper bound on one month task, measured from the moment it gets a worker slot.
    pub task_timeout: Duration,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            policy: PagePolicy::MONTHLY,
            task_timeout: Duration::from_secs(120),
        }
    }
}

/// Count received and sent messages for each window, in parallel.
///
/// At most `throttler.width()` months are counted at once. Results arrive in completion order
/// and are re-sorted so the returned series follows the chronological order of `windows`.
/// A month whose task times out or panics is reported as zeros; the aggregation as a whole
/// cannot fail.
///
/// All month tasks live inside the returned future. Dropping it cancels every outstanding
/// request.
pub async fn aggregate_monthly(
    client: &Client,
    credential: &str,
    windows: &[MonthWindow],
    settings: AggregateSettings,
    throttler: &Arc<Throttler>,
    tracker: &MonthTracker,
) -> Vec<MonthlyCount> {
    run_month_tasks(windows, settings.task_timeout, throttler, tracker, |window| {
        count_month(client, credential, window, settings.policy, throttler)
    })
    .await
}

async fn count_month(client: &Client, credential: &str, window: MonthWindow, policy: PagePolicy, throttler: &Arc<Throttler>) -> MonthlyCount {
    // Sequential on purpose: one worker slot never has more than one request in flight.
    let received = count_messages(client, credential, &window.received_query(), policy, throttler).await;
    let sent = count_messages(client, credential, &window.sent_query(), policy, throttler).await;
    MonthlyCount::new(window, received, sent)
}

async fn run_month_tasks<F, Fut>(
    windows: &[MonthWindow],
    task_timeout: Duration,
    throttler: &Arc<Throttler>,
    tracker: &MonthTracker,
    task: F,
) -> Vec<MonthlyCount>
where
    F: Fn(MonthWindow) -> Fut,
    Fut: Future<Output = MonthlyCount>,
{
    tracker.add_months(windows.len() as u64);

    let mut pending: FuturesUnordered<_> = windows
        .iter()
        .copied()
        .map(|window| {
            let work = task(window);
            async move {
                let _permit = throttler.acquire().await;
                let outcome = AssertUnwindSafe(tokio::time::timeout(task_timeout, work)).catch_unwind().await;
                (window, outcome)
            }
        })
        .collect();

    let mut counts = Vec::with_capacity(windows.len());
    while let Some((window, outcome)) = pending.next().await {
        tracker.complete_month();

        let count = match outcome {
            Ok(Ok(count)) => count,
            Ok(Err(_)) => {
                log::warn!(target: LOG_TARGET, "Counting {window} took longer than {}s, reporting zeros", task_timeout.as_secs());
                MonthlyCount::zero(window)
            }
            Err(_) => {
                log::warn!(target: LOG_TARGET, "Counting {window} failed unexpectedly, reporting zeros");
                MonthlyCount::zero(window)
            }
        };
        counts.push(count);
    }

    into_chronological(counts)
}

/// Sort a completion-ordered batch into ascending (year, month) order.
///
/// The sort is stable, so repeated months keep their relative order.
fn into_chronological(mut counts: Vec<MonthlyCount>) -> Vec<MonthlyCount> {
    counts.sort_by_key(MonthlyCount::sort_key);
    counts
}
