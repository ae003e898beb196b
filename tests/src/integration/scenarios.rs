//! # Acceptance Scenarios
//!
//! Three-node clusters over the loopback network, each node with its own
//! engine, pipelines and in-memory ledger.
//!
//! - A: a valid block spending two of alice's outputs is accepted and
//!   committed on every node
//! - B: a block spending an already spent output is rejected, ledgers untouched
//! - C: an isolated proposer times out and its slot is free again
//! - D: promises for a different proposal leave a preparing slot untouched

#[cfg(test)]
mod tests {
    use crate::fixtures::{block, dump, node_id, transfer, TestCluster, ALICE_1, ALICE_2};
    use ql_04_consensus::{
        codec, AcceptorState, ConsensusError, ConsensusEvent, ConsensusMessage, MessageKind,
        ProposalId, ProposalOutcome,
    };
    use std::time::Duration;
    use tokio::sync::broadcast;

    const SETTLE: Duration = Duration::from_secs(5);

    async fn next_round(events: &mut broadcast::Receiver<ConsensusEvent>) -> ProposalOutcome {
        loop {
            let event = tokio::time::timeout(SETTLE, events.recv())
                .await
                .expect("round finished in time")
                .expect("event stream open");
            if let ConsensusEvent::RoundFinished { outcome, .. } = event {
                return outcome;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_a_valid_block_is_committed_everywhere() {
        let cluster = TestCluster::start(3, 2_000).unwrap();
        let tx = transfer(
            1,
            &[(ALICE_1, "alice"), (ALICE_2, "alice")],
            &[("bob", "widget"), ("carol", "gadget")],
        );
        let bob_key = tx.output_key(0).unwrap();
        let carol_key = tx.output_key(1).unwrap();
        let candidate = block(5, vec![tx]);
        cluster.register_everywhere(&candidate);

        let mut peer_events: Vec<_> = (1..3).map(|i| cluster.node(i).subscribe()).collect();
        let outcome = cluster.node(0).propose_block(candidate).await.unwrap();
        assert_eq!(outcome, ProposalOutcome::Accepted);
        for events in &mut peer_events {
            assert_eq!(next_round(events).await, ProposalOutcome::Accepted);
        }

        for node in &cluster.nodes {
            let utxos = node.utxos();
            assert!(utxos.get(&ALICE_1).unwrap().is_none());
            assert!(utxos.get(&ALICE_2).unwrap().is_none());
            let bob = utxos.get(&bob_key).unwrap().unwrap();
            let carol = utxos.get(&carol_key).unwrap().unwrap();
            assert_eq!((bob.owner.as_str(), bob.product.as_str()), ("bob", "widget"));
            assert_eq!((carol.owner.as_str(), carol.product.as_str()), ("carol", "gadget"));
            assert_eq!(utxos.all().unwrap().len(), 2);
        }

        let snapshots = cluster.settle(SETTLE).await;
        assert!(snapshots.iter().all(|s| s.state == AcceptorState::Idle));
        cluster.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_b_spent_input_is_rejected() {
        let cluster = TestCluster::start(3, 2_000).unwrap();

        let first = block(1, vec![transfer(1, &[(ALICE_1, "alice")], &[("bob", "widget")])]);
        cluster.register_everywhere(&first);
        assert_eq!(
            cluster.node(0).propose_block(first).await.unwrap(),
            ProposalOutcome::Accepted
        );
        cluster.settle(SETTLE).await;

        let before: Vec<_> = cluster
            .nodes
            .iter()
            .map(|node| dump(node.utxos().kv().as_ref()))
            .collect();

        let replay = block(2, vec![transfer(2, &[(ALICE_1, "alice")], &[("mallory", "widget")])]);
        cluster.register_everywhere(&replay);
        assert_eq!(
            cluster.node(0).propose_block(replay).await.unwrap(),
            ProposalOutcome::Rejected
        );
        cluster.settle(SETTLE).await;

        for (node, before) in cluster.nodes.iter().zip(before) {
            assert_eq!(dump(node.utxos().kv().as_ref()), before);
        }
        cluster.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_c_no_quorum_times_out_and_frees_slot() {
        let cluster = TestCluster::start(3, 300).unwrap();
        let proposer = cluster.node(0);
        cluster.network.isolate(proposer.node_id());

        let lonely = block(1, vec![transfer(1, &[(ALICE_1, "alice")], &[("bob", "widget")])]);
        cluster.register_everywhere(&lonely);
        assert_eq!(
            proposer.propose_block(lonely).await.unwrap(),
            ProposalOutcome::TimedOut
        );

        let snapshot = proposer.state().await.unwrap();
        assert_eq!(snapshot.state, AcceptorState::Idle);
        assert!(snapshot.active_proposal.is_none());
        assert!(proposer.utxos().get(&ALICE_1).unwrap().is_some());

        cluster.network.heal(&proposer.node_id());
        let retry = block(2, vec![transfer(2, &[(ALICE_1, "alice")], &[("bob", "widget")])]);
        cluster.register_everywhere(&retry);
        assert_eq!(
            proposer.propose_block(retry).await.unwrap(),
            ProposalOutcome::Accepted
        );
        cluster.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_d_mismatched_promises_are_dropped() {
        let cluster = TestCluster::start(3, 1_000).unwrap();
        let proposer = cluster.node(0);
        cluster.network.isolate(proposer.node_id());

        let candidate = block(1, vec![transfer(1, &[(ALICE_1, "alice")], &[("bob", "widget")])]);
        let header = candidate.header.clone();
        proposer.register_block(candidate);
        let handle = proposer.consensus().clone();
        let round = tokio::spawn(async move { handle.propose(header).await });

        let before = loop {
            let snapshot = proposer.state().await.unwrap();
            if snapshot.state == AcceptorState::Preparing {
                break snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        let active = before.active_proposal.clone().unwrap();

        for peer in [1, 2] {
            let mut foreign = active.clone();
            foreign.proposal_id = ProposalId::generate();
            let message = ConsensusMessage::new(MessageKind::Promise, foreign);
            let bytes = codec::encode(&message).unwrap();
            proposer
                .consensus()
                .on_consensus_message(node_id(peer), &bytes)
                .unwrap();
        }

        let after = proposer.state().await.unwrap();
        assert_eq!(after.state, AcceptorState::Preparing);
        assert_eq!(after.active_proposal.as_ref(), Some(&active));
        assert_eq!(after.promises, before.promises);
        assert_eq!(after.promises, 1);

        assert_eq!(round.await.unwrap().unwrap(), ProposalOutcome::TimedOut);
        cluster.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn scenario_busy_slot_refuses_second_proposal() {
        let cluster = TestCluster::start(3, 500).unwrap();
        let proposer = cluster.node(0);
        cluster.network.isolate(proposer.node_id());

        let handle = proposer.consensus().clone();
        let header = block(1, vec![]).header;
        let round = tokio::spawn(async move { handle.propose(header).await });
        while proposer.state().await.unwrap().state != AcceptorState::Preparing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = proposer
            .consensus()
            .propose(block(2, vec![]).header)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::SlotBusy { .. }));
        assert_eq!(round.await.unwrap().unwrap(), ProposalOutcome::TimedOut);
        cluster.shutdown().await;
    }
}
