//! Acceptor states and round outcomes.

use super::proposal::Proposal;
use std::fmt;

/// State of the single consensus slot.
///
/// `Accepted`, `Rejected` and `TimedOut` are transient: the acceptor passes
/// through them and returns to `Idle` in the same step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceptorState {
    Idle,
    Preparing,
    Promised,
    Committing,
    Accepted,
    Rejected,
    TimedOut,
}

impl AcceptorState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            AcceptorState::Accepted | AcceptorState::Rejected | AcceptorState::TimedOut
        )
    }

    /// States in which a round is in progress.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            AcceptorState::Preparing | AcceptorState::Promised | AcceptorState::Committing
        )
    }
}

impl fmt::Display for AcceptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcceptorState::Idle => "idle",
            AcceptorState::Preparing => "preparing",
            AcceptorState::Promised => "promised",
            AcceptorState::Committing => "committing",
            AcceptorState::Accepted => "accepted",
            AcceptorState::Rejected => "rejected",
            AcceptorState::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalOutcome {
    Accepted,
    Rejected,
    TimedOut,
}

impl ProposalOutcome {
    pub const fn terminal_state(self) -> AcceptorState {
        match self {
            ProposalOutcome::Accepted => AcceptorState::Accepted,
            ProposalOutcome::Rejected => AcceptorState::Rejected,
            ProposalOutcome::TimedOut => AcceptorState::TimedOut,
        }
    }
}

impl fmt::Display for ProposalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.terminal_state(), f)
    }
}

/// Point-in-time view of the acceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptorSnapshot {
    pub state: AcceptorState,
    pub active_proposal: Option<Proposal>,
    /// Distinct promises collected, including our own.
    pub promises: usize,
    pub quorum: usize,
    /// Whether the active proposal originated here.
    pub local: bool,
}
