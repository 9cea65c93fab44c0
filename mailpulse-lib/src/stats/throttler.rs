use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

const LOG_TARGET: &str = " throttler";

/// Bounds how many month tasks run at once and lets any task hold back new dispatch.
///
/// Call [`Throttler::acquire`] before starting a unit of work and keep the permit until the
/// work is done. When the provider signals a rate limit, [`Throttler::pause_for`] parks every
/// task that has not started yet; tasks already holding a permit keep running.
///
/// A pause is only a deadline. Waiting happens inside the callers' futures, so dropping them
/// leaves nothing behind. Overlapping pauses do not stack: the one ending last wins.
#[derive(Debug)]
pub struct Throttler {
    semaphore: Arc<Semaphore>,
    width: usize,
    resume_at: Mutex<Option<Instant>>,
}

impl Throttler {
    /// Create a throttler that admits at most `width` concurrent tasks.
    #[must_use]
    pub fn new(width: usize) -> Arc<Self> {
        let width = width.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(width)),
            width,
            resume_at: Mutex::new(None),
        })
    }

    /// Maximum number of concurrently admitted tasks.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Wait while paused, then take a concurrency slot.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // A pause may be extended while we sleep, so re-check after every wake-up.
        while let Some(until) = self.pending_resume() {
            tokio::time::sleep_until(until).await;
        }

        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("the throttler never closes its semaphore")
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pending_resume().is_some()
    }

    /// Hold back new work for `duration`.
    ///
    /// Returns `false` without changing anything if an existing pause already lasts at
    /// least as long.
    pub fn pause_for(&self, duration: Duration) -> bool {
        let until = Instant::now() + duration;

        {
            let mut resume_at = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
            if resume_at.is_some_and(|existing| existing >= until) {
                return false;
            }
            *resume_at = Some(until);
        }

        log::debug!(target: LOG_TARGET, "Pausing new requests for {}ms", duration.as_millis());
        true
    }

    /// The end of the current pause, or `None` once it has passed.
    fn pending_resume(&self) -> Option<Instant> {
        let mut resume_at = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
        match *resume_at {
            Some(until) if Instant::now() < until => Some(until),
            Some(_) => {
                *resume_at = None;
                log::debug!(target: LOG_TARGET, "Resuming requests");
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_limits_concurrency() {
        let throttler = Throttler::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let throttler = Arc::clone(&throttler);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                tokio::spawn(async move {
                    let _permit = throttler.acquire().await;
                    let current = active.fetch_add(1, Ordering::SeqCst) + 1;
                    _ = max_seen.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    _ = active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        _ = futures_util::future::join_all(tasks).await;

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_zero_width_is_clamped() {
        assert_eq!(Throttler::new(0).width(), 1);
    }

    #[tokio::test]
    async fn test_pause_blocks_new_work() {
        let throttler = Throttler::new(4);
        assert!(throttler.pause_for(Duration::from_millis(200)));
        assert!(throttler.is_paused());

        let start = tokio::time::Instant::now();
        let _permit = throttler.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(!throttler.is_paused());
    }

    #[test]
    fn test_pause_needs_no_runtime() {
        // Pausing only records a deadline; nothing is scheduled behind the caller's back.
        let throttler = Throttler::new(2);
        assert!(throttler.pause_for(Duration::from_secs(30)));
        assert!(throttler.is_paused());
    }

    #[tokio::test]
    async fn test_pause_expires_without_waiters() {
        let throttler = Throttler::new(2);
        assert!(throttler.pause_for(Duration::from_millis(50)));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!throttler.is_paused());
    }

    #[tokio::test]
    async fn test_extended_pause_keeps_waiters_parked() {
        let throttler = Throttler::new(2);
        assert!(throttler.pause_for(Duration::from_millis(100)));

        let waiter = {
            let throttler = Arc::clone(&throttler);
            tokio::spawn(async move {
                let start = tokio::time::Instant::now();
                let _permit = throttler.acquire().await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(throttler.pause_for(Duration::from_millis(250)));

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_shorter_pause_does_not_override_longer() {
        let throttler = Throttler::new(1);
        assert!(throttler.pause_for(Duration::from_millis(300)));
        assert!(!throttler.pause_for(Duration::from_millis(50)));
        assert!(throttler.pause_for(Duration::from_millis(600)));
    }
}
