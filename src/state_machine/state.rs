use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::Quote;
use crate::error::{QuotatoError, Result};

/// The lifecycle state of a vendor job, carrying the data that only exists
/// in that state.
///
/// PENDING → RUNNING → {WAITING, COMPLETED, FAILED}
/// WAITING → {COMPLETED, FAILED, AWAITING_USER_INPUT}
/// AWAITING_USER_INPUT → RUNNING
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Waiting,
    AwaitingUserInput { question: String },
    Completed { quote: Quote },
    Failed { reason: String },
}

impl JobState {
    pub fn kind(&self) -> StateKind {
        match self {
            JobState::Pending => StateKind::Pending,
            JobState::Running => StateKind::Running,
            JobState::Waiting => StateKind::Waiting,
            JobState::AwaitingUserInput { .. } => StateKind::AwaitingUserInput,
            JobState::Completed { .. } => StateKind::Completed,
            JobState::Failed { .. } => StateKind::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

/// Payload-free discriminant of [`JobState`], used for counting, filtering
/// and the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Pending,
    Running,
    Waiting,
    AwaitingUserInput,
    Completed,
    Failed,
}

impl StateKind {
    pub const ALL: [StateKind; 6] = [
        StateKind::Pending,
        StateKind::Running,
        StateKind::Waiting,
        StateKind::AwaitingUserInput,
        StateKind::Completed,
        StateKind::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, StateKind::Completed | StateKind::Failed)
    }

    /// Human label for status output ("Awaiting user input").
    pub fn label(self) -> &'static str {
        match self {
            StateKind::Pending => "Pending",
            StateKind::Running => "Running",
            StateKind::Waiting => "Waiting",
            StateKind::AwaitingUserInput => "Awaiting user input",
            StateKind::Completed => "Completed",
            StateKind::Failed => "Failed",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKind::Pending => write!(f, "pending"),
            StateKind::Running => write!(f, "running"),
            StateKind::Waiting => write!(f, "waiting"),
            StateKind::AwaitingUserInput => write!(f, "awaiting_user_input"),
            StateKind::Completed => write!(f, "completed"),
            StateKind::Failed => write!(f, "failed"),
        }
    }
}

/// The transition table for vendor jobs.
pub struct StateMachine;

impl StateMachine {
    /// States reachable from `from` in one step. Terminal states have none.
    pub fn successors(from: StateKind) -> &'static [StateKind] {
        match from {
            StateKind::Pending => &[StateKind::Running],
            StateKind::Running => &[StateKind::Waiting, StateKind::Completed, StateKind::Failed],
            StateKind::Waiting => &[
                StateKind::Completed,
                StateKind::Failed,
                StateKind::AwaitingUserInput,
            ],
            StateKind::AwaitingUserInput => &[StateKind::Running],
            StateKind::Completed | StateKind::Failed => &[],
        }
    }

    pub fn can_transition(from: StateKind, to: StateKind) -> bool {
        Self::successors(from).contains(&to)
    }

    pub fn check(from: StateKind, to: StateKind) -> Result<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(QuotatoError::InvalidTransition { from, to })
        }
    }
}
