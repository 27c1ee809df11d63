//! Pipeline phase progress
//!
//! A forward-only state machine over the four pipeline phases. A phase moves
//! `pending -> running -> {success|failure}`, recording start and end times on
//! the way; at most one phase may be running, and terminal phases never reset.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Pipeline phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Setup,
    Build,
    Publish,
    Deploy,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Setup, Phase::Build, Phase::Publish, Phase::Deploy];

    pub fn title(&self) -> &'static str {
        match self {
            Phase::Setup => "Setup",
            Phase::Build => "Build",
            Phase::Publish => "Publish",
            Phase::Deploy => "Deploy",
        }
    }
}

/// Lifecycle state of a single phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Pending,
    Running,
    Success,
    Failure,
}

impl PhaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseState::Success | PhaseState::Failure)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PhaseState::Pending => "Pending",
            PhaseState::Running => "Running",
            PhaseState::Success => "Success",
            PhaseState::Failure => "Failure",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            PhaseState::Pending => ":large_blue_circle:",
            PhaseState::Running => ":hourglass_flowing_sand:",
            PhaseState::Success => ":large_green_circle:",
            PhaseState::Failure => ":red_circle:",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("invalid transition for {phase:?}: {from:?} -> {to:?}")]
    InvalidTransition {
        phase: Phase,
        from: PhaseState,
        to: PhaseState,
    },

    #[error("{phase:?} cannot start while {running:?} is running")]
    AlreadyRunning { phase: Phase, running: Phase },
}

/// One phase with its state and transition timestamps
#[derive(Debug, Clone)]
pub struct PhaseProgress {
    pub phase: Phase,
    pub state: PhaseState,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl PhaseProgress {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            state: PhaseState::Pending,
            started_at: None,
            finished_at: None,
        }
    }

    /// Elapsed seconds for terminal phases
    pub fn elapsed_seconds(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }

    /// Chat-renderable one-line summary, e.g. `*Build*: Running :hourglass_flowing_sand:`
    pub fn summary(&self) -> String {
        let mut line = format!(
            "*{}*: {} {}",
            self.phase.title(),
            self.state.label(),
            self.state.emoji()
        );
        if self.state.is_terminal() {
            line.push_str(&format!(" ({} s)", self.elapsed_seconds().unwrap_or(0)));
        }
        line
    }
}

/// Progress of all four phases across one pipeline run
#[derive(Debug, Clone)]
pub struct Progress {
    phases: [PhaseProgress; 4],
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            phases: [
                PhaseProgress::new(Phase::Setup),
                PhaseProgress::new(Phase::Build),
                PhaseProgress::new(Phase::Publish),
                PhaseProgress::new(Phase::Deploy),
            ],
        }
    }

    pub fn phase(&self, phase: Phase) -> &PhaseProgress {
        &self.phases[phase as usize]
    }

    /// Moves a pending phase to running and records its start time
    pub fn start(&mut self, phase: Phase) -> Result<(), ProgressError> {
        if let Some(running) = self.running_phase() {
            return Err(ProgressError::AlreadyRunning {
                phase,
                running,
            });
        }

        let entry = &mut self.phases[phase as usize];
        if entry.state != PhaseState::Pending {
            return Err(ProgressError::InvalidTransition {
                phase,
                from: entry.state,
                to: PhaseState::Running,
            });
        }

        entry.state = PhaseState::Running;
        entry.started_at = Some(Utc::now());
        Ok(())
    }

    /// Moves a running phase to success and records its end time
    pub fn succeed(&mut self, phase: Phase) -> Result<(), ProgressError> {
        self.finish(phase, PhaseState::Success)
    }

    /// Moves a running phase to failure and records its end time
    pub fn fail(&mut self, phase: Phase) -> Result<(), ProgressError> {
        self.finish(phase, PhaseState::Failure)
    }

    /// Fails whichever phase is currently running, if any
    pub fn fail_current(&mut self) {
        if let Some(running) = self.running_phase() {
            // the phase is running, the transition cannot be rejected
            let _ = self.fail(running);
        }
    }

    /// The first running phase, else the most recently finished phase
    pub fn current_phase(&self) -> Phase {
        if let Some(running) = self.running_phase() {
            return running;
        }

        self.phases
            .iter()
            .rev()
            .find(|entry| entry.state.is_terminal())
            .map(|entry| entry.phase)
            .unwrap_or(Phase::Setup)
    }

    /// One summary line per phase, in phase order
    pub fn summary_lines(&self) -> Vec<String> {
        self.phases.iter().map(|entry| entry.summary()).collect()
    }

    fn running_phase(&self) -> Option<Phase> {
        self.phases
            .iter()
            .find(|entry| entry.state == PhaseState::Running)
            .map(|entry| entry.phase)
    }

    fn finish(&mut self, phase: Phase, to: PhaseState) -> Result<(), ProgressError> {
        let entry = &mut self.phases[phase as usize];
        if entry.state != PhaseState::Running {
            return Err(ProgressError::InvalidTransition {
                phase,
                from: entry.state,
                to,
            });
        }

        entry.state = to;
        entry.finished_at = Some(Utc::now());
        Ok(())
    }
}
