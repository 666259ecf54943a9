use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::types::GridSize;

/// Handle for one requested frame callback.
///
/// Tokens are unique per scheduler; the clock only honours the token it is
/// currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

impl FrameToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Abstraction over where "next frame" callbacks come from.
pub trait FrameScheduler: Send {
    /// Requests a callback for the next display frame.
    fn request_frame(&mut self) -> FrameToken;
    /// Withdraws an earlier request. Cancelling an unknown token is a no-op.
    fn cancel(&mut self, token: FrameToken);
}

/// Convenient alias for owning schedulers behind trait objects.
pub type BoxedFrameScheduler = Box<dyn FrameScheduler + Send>;

#[derive(Debug, Default)]
struct ManualQueue {
    next_id: u64,
    pending: Vec<FrameToken>,
    cancelled: Vec<FrameToken>,
    requested: u64,
}

/// Scheduler driven by the caller instead of a display.
///
/// Used for headless runs and tests: clones share one queue, so a handle kept
/// outside the clock can pop requested tokens and feed them back in.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<ManualQueue>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, ManualQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Oldest outstanding request, removed from the queue.
    pub fn take_next(&self) -> Option<FrameToken> {
        let mut queue = self.queue();
        if queue.pending.is_empty() {
            None
        } else {
            Some(queue.pending.remove(0))
        }
    }

    pub fn pending(&self) -> Vec<FrameToken> {
        self.queue().pending.clone()
    }

    pub fn cancelled(&self) -> Vec<FrameToken> {
        self.queue().cancelled.clone()
    }

    /// Total number of requests ever made.
    pub fn requested(&self) -> u64 {
        self.queue().requested
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameToken {
        let mut queue = self.queue();
        queue.next_id += 1;
        queue.requested += 1;
        let token = FrameToken(queue.next_id);
        queue.pending.push(token);
        token
    }

    fn cancel(&mut self, token: FrameToken) {
        let mut queue = self.queue();
        let before = queue.pending.len();
        queue.pending.retain(|pending| *pending != token);
        if queue.pending.len() != before {
            queue.cancelled.push(token);
        }
    }
}

/// Supplies fresh state for a grid, e.g. after a resize or a reseed request.
pub trait SeedSource {
    /// Returns `size.byte_len()` RGBA8 bytes, bottom row first.
    fn generate(&mut self, size: GridSize) -> anyhow::Result<Vec<u8>>;
}

impl<F> SeedSource for F
where
    F: FnMut(GridSize) -> anyhow::Result<Vec<u8>>,
{
    fn generate(&mut self, size: GridSize) -> anyhow::Result<Vec<u8>> {
        self(size)
    }
}

/// Convenient alias for owning seed sources behind trait objects.
pub type BoxedSeedSource = Box<dyn SeedSource>;

/// Rate limiter for hosts that redraw faster than ticks should run.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Builds a pacer from a frames-per-second cap; non-positive caps disable it.
    pub fn from_fps(fps: Option<f32>) -> Self {
        let interval = fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps));
        Self::new(interval)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// True when a tick may run at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        match (self.interval, self.last) {
            (Some(interval), Some(last)) => now.duration_since(last) >= interval,
            _ => true,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Instant at which the next tick becomes ready, if pacing is active.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.interval, self.last) {
            (Some(interval), Some(last)) => Some(last + interval),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_scheduler_shares_queue_between_clones() {
        let handle = ManualScheduler::new();
        let mut boxed: BoxedFrameScheduler = Box::new(handle.clone());
        let first = boxed.request_frame();
        let second = boxed.request_frame();
        assert_ne!(first, second);
        assert_eq!(handle.pending(), vec![first, second]);

        boxed.cancel(second);
        boxed.cancel(FrameToken::new(99));
        assert_eq!(handle.cancelled(), vec![second]);
        assert_eq!(handle.take_next(), Some(first));
        assert_eq!(handle.take_next(), None);
        assert_eq!(handle.requested(), 2);
    }

    #[test]
    fn pacer_waits_for_interval() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(Some(Duration::from_millis(100)));
        assert!(pacer.ready(start));
        pacer.mark(start);
        assert!(!pacer.ready(start + Duration::from_millis(50)));
        assert!(pacer.ready(start + Duration::from_millis(100)));
        assert_eq!(
            pacer.next_deadline(),
            Some(start + Duration::from_millis(100))
        );
    }

    #[test]
    fn pacer_from_fps_ignores_invalid_caps() {
        assert!(FramePacer::from_fps(Some(0.0)).interval().is_none());
        assert!(FramePacer::from_fps(Some(-3.0)).interval().is_none());
        assert!(FramePacer::from_fps(None).interval().is_none());
        assert_eq!(
            FramePacer::from_fps(Some(4.0)).interval(),
            Some(Duration::from_millis(250))
        );
    }
}
