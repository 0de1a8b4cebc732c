//! Pausable frame timer.
//!
//! [`Timer`] produces the per-tick delta and the total running time of the
//! render loop. Time spent stopped (window inactive, resize drag) is excluded
//! from [`Timer::total_time`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::logging::LogSink;

/// Monotonic time source read by the [`Timer`].
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Frame timer with start/stop support.
pub struct Timer<C: Clock = SystemClock> {
    clock: C,
    base_time: Duration,
    paused_time: Duration,
    stop_time: Duration,
    prev_time: Duration,
    curr_time: Duration,
    delta: Duration,
    stopped: bool,
    reset_once: bool,
    sink: Option<Arc<dyn LogSink>>,
}

impl Timer<SystemClock> {
    /// Create a running timer reading wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::default())
    }
}

impl Default for Timer<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Timer<C> {
    /// Create a running timer on the given clock.
    pub fn with_clock(clock: C) -> Self {
        let now = clock.now();
        Self {
            clock,
            base_time: now,
            paused_time: Duration::ZERO,
            stop_time: Duration::ZERO,
            prev_time: now,
            curr_time: now,
            delta: Duration::ZERO,
            stopped: false,
            reset_once: false,
            sink: None,
        }
    }

    /// Also route misuse warnings to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Restart the timer from zero, running.
    pub fn reset(&mut self) {
        if self.reset_once {
            self.warn("Timer::reset called more than once");
        }
        self.reset_once = true;

        let now = self.clock.now();
        self.base_time = now;
        self.prev_time = now;
        self.curr_time = now;
        self.paused_time = Duration::ZERO;
        self.stop_time = Duration::ZERO;
        self.delta = Duration::ZERO;
        self.stopped = false;
    }

    /// Resume after [`stop`](Self::stop). Warns when already running.
    pub fn start(&mut self) {
        if !self.stopped {
            self.warn("Timer::start called while the timer is running");
            return;
        }

        let now = self.clock.now();
        self.paused_time += now.saturating_sub(self.stop_time);
        self.prev_time = now;
        self.stop_time = Duration::ZERO;
        self.stopped = false;
    }

    /// Freeze total time. Warns when already stopped.
    pub fn stop(&mut self) {
        if self.stopped {
            self.warn("Timer::stop called while the timer is stopped");
            return;
        }

        self.stop_time = self.clock.now();
        self.stopped = true;
    }

    /// Advance one frame. The delta is zero while stopped.
    pub fn tick(&mut self) {
        if self.stopped {
            self.delta = Duration::ZERO;
            return;
        }

        self.curr_time = self.clock.now();
        // A clock that steps backwards yields a zero delta, never a negative one.
        self.delta = self.curr_time.saturating_sub(self.prev_time);
        self.prev_time = self.curr_time;
    }

    /// Seconds the timer has been running since the last reset.
    pub fn total_time(&self) -> f32 {
        let end = if self.stopped {
            self.stop_time
        } else {
            self.curr_time
        };
        end.saturating_sub(self.paused_time)
            .saturating_sub(self.base_time)
            .as_secs_f32()
    }

    /// Seconds between the last two ticks.
    pub fn delta_time(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Whether the timer is stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(sink) = &self.sink {
            sink.log(&format!("[WARNING]: {}", message));
        }
    }
}

impl<C: Clock> fmt::Debug for Timer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("total_time", &self.total_time())
            .field("delta_time", &self.delta_time())
            .field("stopped", &self.stopped)
            .finish()
    }
}
