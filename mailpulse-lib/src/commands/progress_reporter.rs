use crate::stats::Progress;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;

type ProgressCallback = Box<dyn Fn() -> (u64, u64, String) + Send + Sync>;

/// Refresh rate for progress updates (10 Hz).
const REFRESH_INTERVAL_MS: u64 = 100;

const DETERMINATE_TEMPLATE: &str = "{prefix:>12.bold.cyan} [{bar:25}] {msg}";
const DETERMINATE_TEMPLATE_NO_COLOR: &str = "{prefix:>12} [{bar:25}] {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>12.bold.cyan} {spinner} {msg}";
const SPINNER_TEMPLATE_NO_COLOR: &str = "{prefix:>12} {spinner} {msg}";

struct DelayedProgressState {
    visible_after: Instant,
    visible: AtomicBool,
    determinate: AtomicBool,
    phase_start_time: Mutex<Instant>,
}

impl Debug for DelayedProgressState {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DelayedProgressState")
            .field("visible_after", &self.visible_after)
            .field("visible", &self.visible)
            .field("determinate", &self.determinate)
            .finish_non_exhaustive()
    }
}

/// A progress indicator on stderr that stays hidden for short builds.
///
/// Starts as a spinner showing the elapsed time of the current phase and switches to a bar
/// once a determinate source is attached.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    state: Arc<DelayedProgressState>,
    message_callback: Arc<Mutex<ProgressCallback>>,
    refresh_task: Arc<JoinHandle<()>>,
    use_colors: bool,
}

impl ProgressReporter {
    /// Create a new progress reporter.
    ///
    /// The indicator only becomes visible if the work is still going after `delay`.
    /// When `use_colors` is false, it is rendered without ANSI styling.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_draw_target(ProgressDrawTarget::hidden());

        let template = if use_colors { SPINNER_TEMPLATE } else { SPINNER_TEMPLATE_NO_COLOR };
        if let Ok(style) = ProgressStyle::default_spinner().template(template) {
            bar.set_style(style);
        }

        let state = Arc::new(DelayedProgressState {
            visible_after: Instant::now() + delay,
            visible: AtomicBool::new(false),
            determinate: AtomicBool::new(false),
            phase_start_time: Mutex::new(Instant::now()),
        });

        let message_callback = Arc::new(Mutex::new(Box::new(|| (0u64, 0u64, String::new())) as ProgressCallback));

        Self {
            refresh_task: Arc::new(tokio::spawn(refresh_task(
                bar.clone(),
                Arc::clone(&state),
                Arc::clone(&message_callback),
            ))),
            bar,
            state,
            message_callback,
            use_colors,
        }
    }

    #[must_use]
    pub const fn use_colors(&self) -> bool {
        self.use_colors
    }
}

impl Progress for ProgressReporter {
    fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
        *self.state.phase_start_time.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn set_determinate(&self, callback: Box<dyn Fn() -> (u64, u64, String) + Send + Sync + 'static>) {
        *self.message_callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;
        self.state.determinate.store(true, Ordering::Relaxed);
        self.bar.set_length(0);
        self.bar.set_position(0);

        let template = if self.use_colors { DETERMINATE_TEMPLATE } else { DETERMINATE_TEMPLATE_NO_COLOR };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            self.bar.set_style(style.progress_chars("=> "));
        }
    }

    fn done(&self) {
        self.refresh_task.abort();
        if self.state.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("state", &self.state)
            .field("use_colors", &self.use_colors)
            .finish_non_exhaustive()
    }
}

/// Background refresh task that periodically updates the progress bar.
async fn refresh_task(bar: ProgressBar, state: Arc<DelayedProgressState>, callback: Arc<Mutex<ProgressCallback>>) {
    let mut interval = tokio::time::interval(Duration::from_millis(REFRESH_INTERVAL_MS));
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !state.visible.load(Ordering::Relaxed) && Instant::now() >= state.visible_after {
            state.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        if !state.visible.load(Ordering::Relaxed) {
            continue;
        }

        if state.determinate.load(Ordering::Relaxed) {
            let (length, position, message) = {
                let callback_guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
                callback_guard()
            };

            if length > 0 {
                bar.set_length(length);
                bar.set_position(position);
            }
            bar.set_message(message);
        } else {
            let elapsed_secs = state
                .phase_start_time
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .elapsed()
                .as_secs();
            bar.set_message(format!("{elapsed_secs}s"));
            bar.tick();
        }
    }
}
