//! # Acceptor
//!
//! The single consensus slot of a node, as a pure state machine. Inputs are
//! local proposals, inbound messages, pipeline results and the clock; outputs
//! are [`Action`]s for the service to carry out. Nothing here performs I/O.
//!
//! ```text
//!   Idle ──propose──→ Preparing ──quorum of promises──→ Promised ──own Commit──→ Committing
//!   Idle ──Prepare──→ Promised ──Commit, or proposer's Accepted──→ Committing
//!   Promised ──proposer's Rejected──→ Rejected ──→ Idle
//!   Committing ──verified, staged, flushed──→ Accepted ──→ Idle
//!   Committing ──any pipeline failure──→ Rejected ──→ Idle
//!   any active state ──deadline──→ TimedOut ──→ Idle
//! ```

use crate::domain::{
    AcceptorSnapshot, AcceptorState, ConsensusConfig, ConsensusError, ConsensusMessage,
    Proposal, ProposalId, ProposalOutcome,
};
use shared_types::NodeId;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Decided proposals remembered so that late or repeated messages about
/// them are ignored. Prepares older than this window are still refused by
/// the committed-height check.
const DECIDED_HISTORY: usize = 64;

/// Work the service must perform on behalf of the acceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send to every peer.
    Broadcast(ConsensusMessage),
    /// Send to one peer.
    Send { to: NodeId, message: ConsensusMessage },
    /// Run the verification pipeline for the proposal's block.
    Verify(Proposal),
    /// Run the commit pipeline (staging only) for the proposal's block.
    Stage(Proposal),
    /// The round ended. `local` is set when this node proposed it.
    Finished {
        proposal: Proposal,
        outcome: ProposalOutcome,
        local: bool,
    },
}

pub struct Acceptor {
    node_id: NodeId,
    members: HashSet<NodeId>,
    quorum: usize,
    timeout: Duration,
    state: AcceptorState,
    active: Option<Proposal>,
    promises: HashSet<NodeId>,
    local: bool,
    deadline: Option<Instant>,
    decided: VecDeque<(ProposalId, ProposalOutcome)>,
    /// Highest block height this node has accepted.
    committed_height: Option<u64>,
}

impl Acceptor {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            node_id: config.node_id,
            members: config.cluster.iter().copied().collect(),
            quorum: config.quorum(),
            timeout: config.proposal_timeout(),
            state: AcceptorState::Idle,
            active: None,
            promises: HashSet::new(),
            local: false,
            deadline: None,
            decided: VecDeque::with_capacity(DECIDED_HISTORY),
            committed_height: None,
        }
    }

    pub fn state(&self) -> AcceptorState {
        self.state
    }

    pub fn active_proposal(&self) -> Option<&Proposal> {
        self.active.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Whether the slot is committing `id`; staged results for anything else
    /// are stale.
    pub fn is_committing(&self, id: &ProposalId) -> bool {
        self.state == AcceptorState::Committing && self.active_id() == Some(*id)
    }

    /// Outcome of a recently decided proposal.
    pub fn decided_outcome(&self, id: &ProposalId) -> Option<ProposalOutcome> {
        self.decided
            .iter()
            .find(|(decided, _)| decided == id)
            .map(|(_, outcome)| *outcome)
    }

    pub fn snapshot(&self) -> AcceptorSnapshot {
        AcceptorSnapshot {
            state: self.state,
            active_proposal: self.active.clone(),
            promises: self.promises.len(),
            quorum: self.quorum,
            local: self.local,
        }
    }

    /// Start a round for a locally created proposal.
    pub fn propose(
        &mut self,
        proposal: Proposal,
        now: Instant,
    ) -> Result<Vec<Action>, ConsensusError> {
        if let Some(active) = &self.active {
            return Err(ConsensusError::SlotBusy {
                active: active.proposal_id,
            });
        }

        info!(
            proposal = %proposal.proposal_id,
            height = proposal.height(),
            quorum = self.quorum,
            "proposing block"
        );
        let mut actions = vec![Action::Broadcast(ConsensusMessage::Prepare(proposal.clone()))];
        self.occupy(proposal, true, now);
        self.transition(AcceptorState::Preparing);
        self.promises.insert(self.node_id);
        self.check_quorum(&mut actions);
        Ok(actions)
    }

    /// Apply a message received from `from`.
    ///
    /// Messages that do not concern the active proposal come back as
    /// `ProtocolMismatch` and change nothing.
    pub fn on_message(
        &mut self,
        from: NodeId,
        message: ConsensusMessage,
        now: Instant,
    ) -> Result<Vec<Action>, ConsensusError> {
        if !self.members.contains(&from) {
            return Err(ConsensusError::UnknownPeer(from));
        }

        let id = message.proposal().proposal_id;
        if let Some(outcome) = self.decided_outcome(&id) {
            debug!(proposal = %id, kind = %message.kind(), %outcome, "message for decided proposal ignored");
            return Ok(Vec::new());
        }

        match message {
            ConsensusMessage::Prepare(proposal) => Ok(self.on_prepare(proposal, now)),
            ConsensusMessage::Promise(proposal) => self.on_promise(from, proposal),
            ConsensusMessage::Commit(proposal) => self.on_commit(from, proposal),
            ConsensusMessage::Accepted(proposal) => {
                self.on_peer_outcome(from, proposal, ProposalOutcome::Accepted)
            }
            ConsensusMessage::Rejected(proposal) => {
                self.on_peer_outcome(from, proposal, ProposalOutcome::Rejected)
            }
        }
    }

    /// Verification pipeline finished for `id`.
    pub fn on_verified(&mut self, id: ProposalId, result: Result<(), String>) -> Vec<Action> {
        let Some(proposal) = self.committing(&id, "verification") else {
            return Vec::new();
        };
        match result {
            Ok(()) => {
                debug!(proposal = %id, "block verified, staging commit");
                vec![Action::Stage(proposal)]
            }
            Err(reason) => {
                info!(proposal = %id, %reason, "block failed verification");
                self.decide(ProposalOutcome::Rejected, true)
            }
        }
    }

    /// Commit pipeline and flush finished for `id`.
    pub fn on_committed(&mut self, id: ProposalId, result: Result<(), String>) -> Vec<Action> {
        if self.committing(&id, "commit").is_none() {
            return Vec::new();
        }
        match result {
            Ok(()) => self.decide(ProposalOutcome::Accepted, true),
            Err(reason) => {
                warn!(proposal = %id, %reason, "block commit failed");
                self.decide(ProposalOutcome::Rejected, true)
            }
        }
    }

    /// Fire the slot deadline if it has passed.
    pub fn on_timeout(&mut self, now: Instant) -> Vec<Action> {
        match self.deadline {
            Some(deadline) if now >= deadline && self.state.is_active() => {}
            _ => return Vec::new(),
        }

        if self.state == AcceptorState::Preparing {
            let reason = ConsensusError::QuorumNotReached {
                promises: self.promises.len(),
                quorum: self.quorum,
            };
            warn!(proposal = ?self.active_id(), %reason, "proposal timed out");
        } else {
            warn!(proposal = ?self.active_id(), state = %self.state, "proposal timed out");
        }
        self.decide(ProposalOutcome::TimedOut, false)
    }

    fn on_prepare(&mut self, proposal: Proposal, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(committed) = self.committed_height {
            if proposal.height() <= committed {
                debug!(
                    proposal = %proposal.proposal_id,
                    height = proposal.height(),
                    committed,
                    "prepare for committed height ignored"
                );
                return actions;
            }
        }

        if let Some(active) = &self.active {
            if active.proposal_id == proposal.proposal_id {
                if self.state == AcceptorState::Promised && !self.local {
                    debug!(proposal = %proposal.proposal_id, "repeating promise");
                    actions.push(self.promise_to(proposal));
                }
                return actions;
            }

            let preemptible =
                matches!(self.state, AcceptorState::Preparing | AcceptorState::Promised);
            if !preemptible || !proposal.outranks(active) {
                debug!(
                    incoming = %proposal.proposal_id,
                    active = %active.proposal_id,
                    state = %self.state,
                    "competing prepare ignored"
                );
                return actions;
            }

            info!(
                incoming = %proposal.proposal_id,
                displaced = %active.proposal_id,
                "preempted by higher-priority proposal"
            );
            if self.local {
                actions.extend(self.decide(ProposalOutcome::Rejected, false));
            } else {
                self.reset();
            }
        }

        debug!(proposal = %proposal.proposal_id, proposer = %proposal.proposer_id, "promising");
        actions.push(self.promise_to(proposal.clone()));
        self.occupy(proposal, false, now);
        self.transition(AcceptorState::Promised);
        actions
    }

    fn on_promise(
        &mut self,
        from: NodeId,
        proposal: Proposal,
    ) -> Result<Vec<Action>, ConsensusError> {
        self.expect_active(&proposal)?;
        if self.state != AcceptorState::Preparing || !self.local {
            debug!(proposal = %proposal.proposal_id, peer = %from, state = %self.state, "late promise ignored");
            return Ok(Vec::new());
        }

        if self.promises.insert(from) {
            debug!(
                proposal = %proposal.proposal_id,
                peer = %from,
                promises = self.promises.len(),
                quorum = self.quorum,
                "promise received"
            );
        }
        let mut actions = Vec::new();
        self.check_quorum(&mut actions);
        Ok(actions)
    }

    fn on_commit(
        &mut self,
        from: NodeId,
        proposal: Proposal,
    ) -> Result<Vec<Action>, ConsensusError> {
        self.expect_active(&proposal)?;
        if self.state != AcceptorState::Promised || self.local || from != proposal.proposer_id {
            debug!(proposal = %proposal.proposal_id, peer = %from, state = %self.state, "commit ignored");
            return Ok(Vec::new());
        }

        self.transition(AcceptorState::Committing);
        Ok(vec![Action::Verify(proposal)])
    }

    fn on_peer_outcome(
        &mut self,
        from: NodeId,
        proposal: Proposal,
        outcome: ProposalOutcome,
    ) -> Result<Vec<Action>, ConsensusError> {
        self.expect_active(&proposal)?;
        if from != proposal.proposer_id || self.local || self.state != AcceptorState::Promised {
            debug!(
                proposal = %proposal.proposal_id,
                peer = %from,
                %outcome,
                state = %self.state,
                "peer outcome ignored"
            );
            return Ok(Vec::new());
        }

        match outcome {
            // The proposer only announces Accepted after its own commit, so the
            // Commit to this node was lost. Run the pipeline as if it had arrived.
            ProposalOutcome::Accepted => {
                info!(proposal = %proposal.proposal_id, peer = %from, "proposer accepted, committing without Commit");
                self.transition(AcceptorState::Committing);
                Ok(vec![Action::Verify(proposal)])
            }
            _ => {
                warn!(proposal = %proposal.proposal_id, peer = %from, %outcome, "proposer abandoned round before commit");
                Ok(self.decide(outcome, false))
            }
        }
    }

    fn check_quorum(&mut self, actions: &mut Vec<Action>) {
        if self.state != AcceptorState::Preparing || self.promises.len() < self.quorum {
            return;
        }
        let Some(proposal) = self.active.clone() else {
            return;
        };

        info!(
            proposal = %proposal.proposal_id,
            promises = self.promises.len(),
            "quorum reached, committing"
        );
        self.transition(AcceptorState::Promised);
        actions.push(Action::Broadcast(ConsensusMessage::Commit(proposal.clone())));
        // The proposer handles its own Commit.
        self.transition(AcceptorState::Committing);
        actions.push(Action::Verify(proposal));
    }

    fn promise_to(&self, proposal: Proposal) -> Action {
        Action::Send {
            to: proposal.proposer_id,
            message: ConsensusMessage::Promise(proposal),
        }
    }

    fn expect_active(&self, proposal: &Proposal) -> Result<(), ConsensusError> {
        match self.active_id() {
            Some(active) if active == proposal.proposal_id => Ok(()),
            active => Err(ConsensusError::ProtocolMismatch {
                active,
                received: proposal.proposal_id,
            }),
        }
    }

    fn committing(&self, id: &ProposalId, stage: &str) -> Option<Proposal> {
        if self.is_committing(id) {
            self.active.clone()
        } else {
            debug!(proposal = %id, stage, "stale pipeline result discarded");
            None
        }
    }

    fn active_id(&self) -> Option<ProposalId> {
        self.active.as_ref().map(|p| p.proposal_id)
    }

    fn occupy(&mut self, proposal: Proposal, local: bool, now: Instant) {
        self.active = Some(proposal);
        self.local = local;
        self.promises.clear();
        self.deadline = Some(now + self.timeout);
    }

    /// End the active round: pass through the terminal state, back to Idle.
    fn decide(&mut self, outcome: ProposalOutcome, announce: bool) -> Vec<Action> {
        let Some(proposal) = self.active.clone() else {
            return Vec::new();
        };
        let local = self.local;

        self.transition(outcome.terminal_state());
        let mut actions = Vec::new();
        if announce {
            let message = match outcome {
                ProposalOutcome::Accepted => Some(ConsensusMessage::Accepted(proposal.clone())),
                ProposalOutcome::Rejected => Some(ConsensusMessage::Rejected(proposal.clone())),
                ProposalOutcome::TimedOut => None,
            };
            actions.extend(message.map(Action::Broadcast));
        }

        if self.decided.len() == DECIDED_HISTORY {
            self.decided.pop_front();
        }
        self.decided.push_back((proposal.proposal_id, outcome));
        if outcome == ProposalOutcome::Accepted {
            self.committed_height = self.committed_height.max(Some(proposal.height()));
        }

        info!(proposal = %proposal.proposal_id, height = proposal.height(), %outcome, local, "round finished");
        actions.push(Action::Finished {
            proposal,
            outcome,
            local,
        });
        self.reset();
        actions
    }

    fn reset(&mut self) {
        self.active = None;
        self.local = false;
        self.promises.clear();
        self.deadline = None;
        self.transition(AcceptorState::Idle);
    }

    fn transition(&mut self, next: AcceptorState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "acceptor transition");
            self.state = next;
        }
    }
}
