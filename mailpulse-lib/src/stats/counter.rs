use super::client::{ApiResult, Client};
use super::throttler::Throttler;
use core::time::Duration;
use std::sync::Arc;

const LOG_TARGET: &str = "   counter";

/// Pause applied when the provider rate limits us without saying for how long.
const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(5);

/// Upper bound on how long a single rate-limit signal may hold back new work.
const MAX_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// How many pages to walk and how large each page is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePolicy {
    pub page_size: u32,
    pub max_pages: u32,
}

impl PagePolicy {
    /// Policy for each month of the trailing series.
    pub const MONTHLY: Self = Self {
        page_size: 1000,
        max_pages: 3,
    };

    /// Policy for the current-month totals.
    pub const CURRENT_MONTH: Self = Self {
        page_size: 1000,
        max_pages: 5,
    };
}

/// Count messages matching `query`, walking at most `policy.max_pages` pages.
///
/// This is a best-effort count. Pagination stops at the first page without a continuation
/// cursor, at the page limit, or at the first failed request, and whatever has been counted so
/// far is returned. Failures are logged, never retried, and never reported to the caller.
///
/// A rate-limit response additionally pauses `throttler` so that work not yet started backs off.
pub async fn count_messages(client: &Client, credential: &str, query: &str, policy: PagePolicy, throttler: &Arc<Throttler>) -> u64 {
    let mut total = 0u64;
    let mut page_token: Option<String> = None;

    for page in 1..=policy.max_pages {
        match client.list_messages(credential, query, policy.page_size, page_token.as_deref()).await {
            ApiResult::Success(listing) => {
                total += listing.messages.len() as u64;

                match listing.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => {
                        log::debug!(target: LOG_TARGET, "Counted {total} message(s) for '{query}' in {page} page(s)");
                        return total;
                    }
                }
            }

            ApiResult::RateLimited(delay) => {
                let pause = delay.unwrap_or(DEFAULT_RATE_LIMIT_PAUSE).min(MAX_RATE_LIMIT_PAUSE);
                if throttler.pause_for(pause) {
                    log::warn!(target: LOG_TARGET, "Rate limited while counting '{query}', holding new requests for {}s", pause.as_secs());
                }
                return total;
            }

            ApiResult::Failed(e) => {
                log::warn!(target: LOG_TARGET, "Stopped counting '{query}' at page {page} with {total} message(s) so far: {e:#}");
                return total;
            }
        }
    }

    log::debug!(target: LOG_TARGET, "Reached the {}-page limit for '{query}' with {total} message(s)", policy.max_pages);
    total
}
