//! # Consensus Service
//!
//! Owns the [`Acceptor`] on a single tokio task. Local proposals, inbound
//! messages, pipeline results and the slot deadline are all funnelled into
//! that task's `select!` loop, so the acceptor is only ever touched there.
//!
//! Pipeline work runs on spawned tasks and reports back tagged with its
//! proposal id. A staged block is flushed on the loop, and only while the
//! slot is still committing that proposal. The flush is synchronous; on a
//! multi-threaded runtime it runs under `block_in_place` so the worker's
//! other tasks move elsewhere while it writes.

use crate::acceptor::{Acceptor, Action};
use crate::codec::{self, WireHints};
use crate::domain::{
    AcceptorSnapshot, ConsensusConfig, ConsensusError, ConsensusMessage, Proposal, ProposalId,
    ProposalOutcome,
};
use crate::events::ConsensusEvent;
use crate::ports::{BlockLedger, Clock, ConsensusApi, LedgerError, PeerTransport};
use async_trait::async_trait;
use shared_types::{BlockHeader, NodeId};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type ProposeReply = oneshot::Sender<Result<ProposalOutcome, ConsensusError>>;

enum Request {
    Propose {
        header: BlockHeader,
        reply: ProposeReply,
    },
    Inbound {
        from: NodeId,
        message: ConsensusMessage,
    },
    Snapshot {
        reply: oneshot::Sender<AcceptorSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Run blocking work from the event loop. `block_in_place` panics on a
/// current-thread runtime, where the work runs inline instead.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

enum PipelineResult<S> {
    Verified {
        id: ProposalId,
        result: Result<(), LedgerError>,
    },
    Staged {
        id: ProposalId,
        result: Result<S, LedgerError>,
    },
}

/// The consensus event loop.
pub struct ConsensusService<L: BlockLedger> {
    node_id: NodeId,
    acceptor: Acceptor,
    transport: Arc<dyn PeerTransport>,
    ledger: Arc<L>,
    clock: Arc<dyn Clock>,
    requests: mpsc::UnboundedReceiver<Request>,
    results_tx: mpsc::UnboundedSender<PipelineResult<L::Staged>>,
    results_rx: mpsc::UnboundedReceiver<PipelineResult<L::Staged>>,
    events: broadcast::Sender<ConsensusEvent>,
    pending: Option<(ProposalId, ProposeReply)>,
}

impl<L: BlockLedger> ConsensusService<L> {
    /// Validate `config` and start the event loop on the current runtime.
    pub fn spawn(
        config: ConsensusConfig,
        transport: Arc<dyn PeerTransport>,
        ledger: Arc<L>,
        clock: Arc<dyn Clock>,
    ) -> Result<(ConsensusHandle, JoinHandle<()>), ConsensusError> {
        config.validate()?;

        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity);

        let handle = ConsensusHandle {
            node_id: config.node_id,
            requests: requests_tx,
            events: events.clone(),
            hints: config.wire_hints(),
        };
        let service = Self {
            node_id: config.node_id,
            acceptor: Acceptor::new(&config),
            transport,
            ledger,
            clock,
            requests,
            results_tx,
            results_rx,
            events,
            pending: None,
        };

        info!(
            node = %config.node_id,
            cluster = config.cluster_size(),
            quorum = config.quorum(),
            timeout_ms = config.proposal_timeout_ms,
            "consensus service starting"
        );
        Ok((handle, tokio::spawn(service.run())))
    }

    async fn run(mut self) {
        loop {
            let deadline = self.acceptor.deadline();
            tokio::select! {
                request = self.requests.recv() => {
                    let keep_running = match request {
                        Some(request) => self.handle_request(request),
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                }
                Some(result) = self.results_rx.recv() => self.handle_result(result),
                fired = wait_until(deadline) => {
                    let actions = self.acceptor.on_timeout(fired);
                    self.execute(actions);
                }
            }
        }
        info!(node = %self.node_id, "consensus service stopped");
    }

    /// Returns false once the loop should stop.
    fn handle_request(&mut self, request: Request) -> bool {
        match request {
            Request::Propose { header, reply } => {
                let proposal = Proposal::new(self.node_id, header, self.clock.wall_millis());
                let id = proposal.proposal_id;
                match self.acceptor.propose(proposal, self.clock.now()) {
                    Ok(actions) => {
                        self.pending = Some((id, reply));
                        self.execute(actions);
                    }
                    Err(e) => {
                        debug!(error = %e, "proposal refused");
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Request::Inbound { from, message } => {
                let kind = message.kind();
                match self.acceptor.on_message(from, message, self.clock.now()) {
                    Ok(actions) => self.execute(actions),
                    Err(e) => debug!(peer = %from, %kind, error = %e, "consensus message dropped"),
                }
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.acceptor.snapshot());
            }
            Request::Shutdown { reply } => {
                info!(node = %self.node_id, "consensus service shutting down");
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_result(&mut self, result: PipelineResult<L::Staged>) {
        let actions = match result {
            PipelineResult::Verified { id, result } => {
                self.report_fatal(&result);
                self.acceptor
                    .on_verified(id, result.map_err(|e| e.to_string()))
            }
            PipelineResult::Staged { id, result } => {
                let committed = match result {
                    Ok(staged) if self.acceptor.is_committing(&id) => {
                        let ledger = &self.ledger;
                        blocking(|| ledger.flush_block(staged))
                    }
                    Ok(_) => {
                        debug!(proposal = %id, "stale staged block dropped unflushed");
                        return;
                    }
                    Err(e) => Err(e),
                };
                self.report_fatal(&committed);
                self.acceptor
                    .on_committed(id, committed.map_err(|e| e.to_string()))
            }
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(message) => {
                    if let Err(e) = self.transport.broadcast(&message) {
                        warn!(kind = %message.kind(), error = %e, "broadcast failed");
                    }
                }
                Action::Send { to, message } => {
                    if let Err(e) = self.transport.send(to, &message) {
                        warn!(peer = %to, kind = %message.kind(), error = %e, "send failed");
                    }
                }
                Action::Verify(proposal) => self.spawn_verify(proposal),
                Action::Stage(proposal) => self.spawn_stage(proposal),
                Action::Finished {
                    proposal,
                    outcome,
                    local,
                } => self.finish(proposal, outcome, local),
            }
        }
    }

    fn spawn_verify(&self, proposal: Proposal) {
        let ledger = Arc::clone(&self.ledger);
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let result = ledger.verify_block(&proposal.block_header).await;
            let _ = results.send(PipelineResult::Verified {
                id: proposal.proposal_id,
                result,
            });
        });
    }

    fn spawn_stage(&self, proposal: Proposal) {
        let ledger = Arc::clone(&self.ledger);
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let result = ledger.stage_block(&proposal.block_header).await;
            let _ = results.send(PipelineResult::Staged {
                id: proposal.proposal_id,
                result,
            });
        });
    }

    fn finish(&mut self, proposal: Proposal, outcome: ProposalOutcome, local: bool) {
        if local {
            match self.pending.take() {
                Some((id, reply)) if id == proposal.proposal_id => {
                    let _ = reply.send(Ok(outcome));
                }
                other => self.pending = other,
            }
        }
        let _ = self.events.send(ConsensusEvent::RoundFinished {
            proposal_id: proposal.proposal_id,
            block_hash: proposal.block_header.hash,
            height: proposal.block_header.height,
            outcome,
            local,
        });
    }

    fn report_fatal<T>(&self, result: &Result<T, LedgerError>) {
        if let Err(e) = result {
            if e.is_fatal() {
                error!(node = %self.node_id, error = %e, "ledger corruption detected");
                let _ = self.events.send(ConsensusEvent::Fatal {
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Resolves at `deadline`, or never.
async fn wait_until(deadline: Option<Instant>) -> Instant {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(deadline).await;
            deadline
        }
        None => std::future::pending().await,
    }
}

/// Cheap, cloneable handle to a running [`ConsensusService`].
#[derive(Clone)]
pub struct ConsensusHandle {
    node_id: NodeId,
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<ConsensusEvent>,
    hints: WireHints,
}

impl ConsensusHandle {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Wire hints this node encodes and decodes with.
    pub fn wire_hints(&self) -> WireHints {
        self.hints
    }

    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsensusEvent> {
        self.events.subscribe()
    }

    pub async fn propose(&self, header: BlockHeader) -> Result<ProposalOutcome, ConsensusError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Propose { header, reply })?;
        rx.await.map_err(|_| ConsensusError::ServiceStopped)?
    }

    pub fn on_consensus_message(&self, peer: NodeId, bytes: &[u8]) -> Result<(), ConsensusError> {
        let message = codec::decode_with(bytes, self.hints).map_err(|e| {
            warn!(peer = %peer, bytes = bytes.len(), error = %e, "undecodable consensus message dropped");
            e
        })?;
        self.deliver(peer, message)
    }

    /// Hand over an already decoded message.
    pub fn deliver(&self, from: NodeId, message: ConsensusMessage) -> Result<(), ConsensusError> {
        self.submit(Request::Inbound { from, message })
    }

    pub async fn state(&self) -> Result<AcceptorSnapshot, ConsensusError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Request::Snapshot { reply })?;
        rx.await.map_err(|_| ConsensusError::ServiceStopped)
    }

    /// Stop the event loop. A pending `propose` resolves with
    /// `ServiceStopped`.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.submit(Request::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    fn submit(&self, request: Request) -> Result<(), ConsensusError> {
        self.requests
            .send(request)
            .map_err(|_| ConsensusError::ServiceStopped)
    }
}

#[async_trait]
impl ConsensusApi for ConsensusHandle {
    async fn propose(&self, header: BlockHeader) -> Result<ProposalOutcome, ConsensusError> {
        ConsensusHandle::propose(self, header).await
    }

    fn on_consensus_message(&self, peer: NodeId, bytes: &[u8]) -> Result<(), ConsensusError> {
        ConsensusHandle::on_consensus_message(self, peer, bytes)
    }

    async fn state(&self) -> Result<AcceptorSnapshot, ConsensusError> {
        ConsensusHandle::state(self).await
    }
}

impl std::fmt::Debug for ConsensusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusHandle")
            .field("node_id", &self.node_id)
            .field("running", &self.is_running())
            .finish()
    }
}
