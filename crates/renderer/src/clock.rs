use crate::runtime::{BoxedFrameScheduler, FrameToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("simulation is already running")]
    AlreadyRunning,
}

/// What `fire` decided for a delivered frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The token was the pending one; the caller should tick now and then
    /// call `finish_tick`.
    Tick,
    /// Stale or cancelled token; nothing to do.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunState {
    running: bool,
    pending: Option<FrameToken>,
}

/// Start/stop state for the tick loop.
///
/// While running, exactly one frame request is outstanding between ticks.
/// `stop` withdraws it, so no tick observes a stopped clock. The first tick
/// of a run is driven by `begin`'s caller rather than by a callback.
pub struct SimulationClock {
    scheduler: BoxedFrameScheduler,
    state: RunState,
}

impl SimulationClock {
    pub fn new(scheduler: BoxedFrameScheduler) -> Self {
        Self {
            scheduler,
            state: RunState::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn pending(&self) -> Option<FrameToken> {
        self.state.pending
    }

    /// Marks the loop running. The caller runs the first tick straight away
    /// and then calls `finish_tick`, which requests the next frame.
    pub fn begin(&mut self) -> Result<(), ClockError> {
        if self.state.running {
            tracing::error!("begin called while the simulation is already running");
            return Err(ClockError::AlreadyRunning);
        }
        self.state.running = true;
        tracing::debug!("simulation started");
        Ok(())
    }

    /// Stops the loop. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if let Some(token) = self.state.pending.take() {
            self.scheduler.cancel(token);
        }
        if self.state.running {
            tracing::debug!("simulation stopped");
        }
        self.state.running = false;
    }

    /// Consumes a delivered callback.
    pub fn fire(&mut self, token: FrameToken) -> FireOutcome {
        if self.state.running && self.state.pending == Some(token) {
            self.state.pending = None;
            FireOutcome::Tick
        } else {
            tracing::trace!(token = token.id(), "ignoring stale frame callback");
            FireOutcome::Ignored
        }
    }

    /// Schedules the next frame after a tick, if still running.
    pub fn finish_tick(&mut self) -> Option<FrameToken> {
        if !self.state.running || self.state.pending.is_some() {
            return self.state.pending;
        }
        let token = self.scheduler.request_frame();
        self.state.pending = Some(token);
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualScheduler;

    fn clock() -> (SimulationClock, ManualScheduler) {
        let handle = ManualScheduler::new();
        (SimulationClock::new(Box::new(handle.clone())), handle)
    }

    /// `begin` plus the inline first tick, as `Simulation::begin` does it.
    fn start(clock: &mut SimulationClock) -> FrameToken {
        clock.begin().unwrap();
        clock.finish_tick().unwrap()
    }

    #[test]
    fn begin_twice_is_rejected() {
        let (mut clock, handle) = clock();
        start(&mut clock);
        assert_eq!(clock.begin(), Err(ClockError::AlreadyRunning));
        assert!(clock.is_running());
        assert_eq!(handle.requested(), 1);
    }

    #[test]
    fn begin_requests_nothing_until_the_first_tick_finishes() {
        let (mut clock, handle) = clock();
        clock.begin().unwrap();
        assert!(clock.pending().is_none());
        assert_eq!(handle.requested(), 0);
        let token = clock.finish_tick().unwrap();
        assert_eq!(handle.pending(), vec![token]);
    }

    #[test]
    fn stop_cancels_pending_frame_and_is_idempotent() {
        let (mut clock, handle) = clock();
        let token = start(&mut clock);
        clock.stop();
        clock.stop();
        assert!(!clock.is_running());
        assert!(handle.pending().is_empty());
        assert_eq!(handle.cancelled(), vec![token]);
        assert_eq!(clock.fire(token), FireOutcome::Ignored);
    }

    #[test]
    fn each_tick_schedules_exactly_one_follow_up() {
        let (mut clock, handle) = clock();
        start(&mut clock);
        for _ in 0..3 {
            let token = handle.take_next().unwrap();
            assert_eq!(clock.fire(token), FireOutcome::Tick);
            assert_eq!(clock.fire(token), FireOutcome::Ignored);
            clock.finish_tick();
            assert_eq!(handle.pending().len(), 1);
        }
        assert_eq!(handle.requested(), 4);
    }

    #[test]
    fn stop_during_tick_prevents_rescheduling() {
        let (mut clock, handle) = clock();
        start(&mut clock);
        let token = handle.take_next().unwrap();
        assert_eq!(clock.fire(token), FireOutcome::Tick);
        clock.stop();
        assert_eq!(clock.finish_tick(), None);
        assert!(handle.pending().is_empty());
    }

    #[test]
    fn restart_after_stop() {
        let (mut clock, handle) = clock();
        start(&mut clock);
        clock.stop();
        let token = start(&mut clock);
        assert_eq!(handle.pending(), vec![token]);
    }
}
