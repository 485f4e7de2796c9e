//! Lifecycle state machine (spec §4.6): `stopped -> starting -> running ⇄
//! paused -> stopping -> stopped`, serialized with a state mutex the same
//! way the teacher's broker connection state machine serializes its own
//! transitions, generalized from a WebSocket reconnect lifecycle to the
//! scheduler's start/stop/pause/resume operations.

use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// A lifecycle phase of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No loops running; the initial and final state.
    Stopped,
    /// `start()` has been called; loops are being spawned.
    Starting,
    /// Evaluation and exit loops are active.
    Running,
    /// Loops are alive but skip their work each tick.
    Paused,
    /// `stop()` has been called; loops are being cancelled and drained.
    Stopping,
}

impl Display for SchedulerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Starting => "starting",
            SchedulerState::Running => "running",
            SchedulerState::Paused => "paused",
            SchedulerState::Stopping => "stopping",
        };
        write!(f, "{s}")
    }
}

/// Operations that drive the state machine (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// `start()`: begin spawning loops.
    Start,
    /// Loops have been spawned and are ticking.
    Started,
    /// `pause()`: loops keep running but skip work.
    Pause,
    /// `resume()`: resume doing work.
    Resume,
    /// `stop()`: begin cancelling loops.
    Stop,
    /// Loops have drained and exited.
    Stopped,
}

/// An operation was requested from a state that does not support it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cannot apply {transition:?} from state {from}")]
pub struct StateError {
    /// State the machine was in when the invalid transition was requested.
    pub from: SchedulerState,
    /// The transition that was rejected.
    pub transition: StateTransition,
}

impl SchedulerState {
    /// Applies `event`, returning the new state or a [`StateError`] if the
    /// transition is not defined from the current state.
    pub fn transition(self, event: StateTransition) -> Result<Self, StateError> {
        use SchedulerState::{Paused, Running, Starting, Stopped, Stopping};
        use StateTransition as T;

        match (self, event) {
            (Stopped, T::Start) => Ok(Starting),
            (Starting, T::Started) => Ok(Running),
            (Running, T::Pause) => Ok(Paused),
            (Paused, T::Resume) => Ok(Running),
            (Running, T::Stop) | (Paused, T::Stop) | (Starting, T::Stop) => Ok(Stopping),
            (Stopping, T::Stopped) => Ok(Stopped),
            (from, transition) => Err(StateError { from, transition }),
        }
    }

    /// True when the evaluation/exit loops should perform real work on their tick.
    pub fn should_tick(&self) -> bool {
        matches!(self, SchedulerState::Running)
    }

    /// True when loops should still be alive (running or paused), as
    /// opposed to cancelled.
    pub fn loops_should_be_alive(&self) -> bool {
        matches!(self, SchedulerState::Running | SchedulerState::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_round_trips() {
        let mut state = SchedulerState::Stopped;
        state = state.transition(StateTransition::Start).unwrap();
        assert_eq!(state, SchedulerState::Starting);
        state = state.transition(StateTransition::Started).unwrap();
        assert_eq!(state, SchedulerState::Running);
        state = state.transition(StateTransition::Pause).unwrap();
        assert_eq!(state, SchedulerState::Paused);
        state = state.transition(StateTransition::Resume).unwrap();
        assert_eq!(state, SchedulerState::Running);
        state = state.transition(StateTransition::Stop).unwrap();
        assert_eq!(state, SchedulerState::Stopping);
        state = state.transition(StateTransition::Stopped).unwrap();
        assert_eq!(state, SchedulerState::Stopped);
    }

    #[test]
    fn pause_from_stopped_is_rejected() {
        let err = SchedulerState::Stopped.transition(StateTransition::Pause).unwrap_err();
        assert_eq!(err.from, SchedulerState::Stopped);
    }

    #[test]
    fn stop_is_reachable_from_paused() {
        let state = SchedulerState::Paused.transition(StateTransition::Stop).unwrap();
        assert_eq!(state, SchedulerState::Stopping);
    }
}
