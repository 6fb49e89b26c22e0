use std::time::{Duration, Instant};

/// Monotonic time source used to pace playback
pub trait Clock {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;

    /// Block the calling thread for the given duration
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Outcome of comparing a frame's ideal presentation time with the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderDecision {
    pub render: bool,
    pub sleep: Duration,
}

impl RenderDecision {
    pub fn skip() -> Self {
        Self {
            render: false,
            sleep: Duration::ZERO,
        }
    }
}

/// Ideal presentation offset of a frame from the start of playback
pub fn presentation_time(frame_index: u64, frame_duration: Duration) -> Duration {
    frame_duration.mul_f64(frame_index as f64)
}

/// Decide whether frame `frame_index` is drawn.
///
/// A frame whose ideal time is still ahead sleeps for the difference and renders.
/// A frame that is due or late is dropped. Video chases the wall clock, it never
/// stretches time.
pub fn should_render(
    frame_index: u64,
    frame_duration: Duration,
    start_time: Duration,
    now: Duration,
) -> RenderDecision {
    let ideal = presentation_time(frame_index, frame_duration);
    let elapsed = now.saturating_sub(start_time);

    match ideal.checked_sub(elapsed) {
        Some(delta) if !delta.is_zero() => RenderDecision {
            render: true,
            sleep: delta,
        },
        _ => RenderDecision::skip(),
    }
}

/// Count of frames considered since playback started
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    index: u64,
}

impl FrameCursor {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn advance(&mut self) {
        self.index += 1;
    }
}

/// Frame duration for a nominal frame rate
pub fn frame_duration(fps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / fps)
}
