//! # Cross-Crate Properties
//!
//! Randomized checks of the guarantees the node relies on:
//!
//! - wire round-trip of every message kind, with and without hints
//! - no node accepts two competing proposals, and replays change nothing
//! - a task tree notifies its root exactly once, whatever the leaf order
//! - a failed commit leaves storage bit-for-bit untouched
//! - verifying a block twice against the same ledger gives the same answer

#[cfg(test)]
mod tests {
    use crate::fixtures::{
        block, dump, genesis, seeded_store, transfer, TestCluster, ALICE_1, ALICE_2,
    };
    use ql_01_ledger_storage::{FaultyKVStore, UtxoStore};
    use ql_02_task_engine::{task_fn, EngineConfig, TaskEngine, TaskStatus};
    use ql_03_block_pipeline::{BlockPipeline, PipelineError};
    use ql_04_consensus::{
        codec, AcceptorState, ConsensusError, ConsensusEvent, ConsensusMessage, MessageKind,
        Proposal, ProposalId, ProposalOutcome, WireHints, PROTOCOL_VERSION,
    };
    use rand::Rng;
    use shared_types::{BlockHeader, NodeId};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    const KINDS: [MessageKind; 5] = [
        MessageKind::Prepare,
        MessageKind::Promise,
        MessageKind::Commit,
        MessageKind::Accepted,
        MessageKind::Rejected,
    ];

    fn random_proposal(rng: &mut impl Rng) -> Proposal {
        Proposal {
            timestamp: rng.gen(),
            proposal_id: ProposalId(rng.gen()),
            proposer_id: NodeId(rng.gen()),
            block_header: BlockHeader {
                timestamp: rng.gen(),
                height: rng.gen(),
                previous_hash: rng.gen(),
                merkle_root: rng.gen(),
                hash: rng.gen(),
            },
        }
    }

    fn assert_same_proposal(decoded: &ConsensusMessage, original: &ConsensusMessage) {
        assert_eq!(decoded.kind(), original.kind());
        let (a, b) = (decoded.proposal(), original.proposal());
        assert_eq!(a.proposal_id, b.proposal_id);
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.proposer_id, b.proposer_id);
        assert_eq!(a.block_header, b.block_header);
    }

    fn test_engine(workers: usize) -> TaskEngine {
        TaskEngine::new(EngineConfig::for_testing(workers)).unwrap()
    }

    // ---------------------------------------------------------------------
    // Wire round-trip
    // ---------------------------------------------------------------------

    #[test]
    fn prop_codec_round_trip_without_hints() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let kind = KINDS[rng.gen_range(0..KINDS.len())];
            let message = ConsensusMessage::new(kind, random_proposal(&mut rng));

            let bytes = codec::encode(&message).unwrap();
            assert_eq!(bytes.len(), codec::MAX_MESSAGE_SIZE);
            let decoded = codec::decode(&bytes).unwrap();
            assert_same_proposal(&decoded, &message);
            assert_eq!(codec::encode(&decoded).unwrap(), bytes);
        }
    }

    #[test]
    fn prop_codec_round_trip_with_hints() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let kind = KINDS[rng.gen_range(0..KINDS.len())];
            let message = ConsensusMessage::new(kind, random_proposal(&mut rng));
            let hints = WireHints::default()
                .with_kind(kind)
                .with_version(PROTOCOL_VERSION);

            let bytes = codec::encode_with(&message, hints).unwrap();
            assert_eq!(bytes.len(), codec::PROPOSAL_WIRE_SIZE);
            let decoded = codec::decode_with(&bytes, hints).unwrap();
            assert_same_proposal(&decoded, &message);
        }
    }

    #[test]
    fn prop_truncated_messages_never_decode() {
        let mut rng = rand::thread_rng();
        let message = ConsensusMessage::new(MessageKind::Commit, random_proposal(&mut rng));
        let bytes = codec::encode(&message).unwrap();
        for _ in 0..50 {
            let cut = rng.gen_range(0..bytes.len());
            assert!(codec::decode(&bytes[..cut]).is_err());
        }
    }

    // ---------------------------------------------------------------------
    // At most one commit
    // ---------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn prop_competing_proposals_commit_at_most_once_per_node() {
        for _ in 0..5 {
            let cluster = TestCluster::start(3, 500).unwrap();
            let mut events: Vec<_> = cluster.nodes.iter().map(|n| n.subscribe()).collect();

            let to_bob = transfer(1, &[(ALICE_1, "alice")], &[("bob", "widget")]);
            let to_carol = transfer(2, &[(ALICE_1, "alice")], &[("carol", "widget")]);
            let bob_key = to_bob.output_key(0).unwrap();
            let carol_key = to_carol.output_key(0).unwrap();
            let first = block(1, vec![to_bob]);
            let second = block(2, vec![to_carol]);
            cluster.register_everywhere(&first);
            cluster.register_everywhere(&second);

            let rounds: HashMap<_, _> = [
                (first.hash(), (first.header.clone(), cluster.node(0).node_id())),
                (second.hash(), (second.header.clone(), cluster.node(1).node_id())),
            ]
            .into_iter()
            .collect();

            let (a, b) = tokio::join!(
                cluster.node(0).propose_block(first),
                cluster.node(1).propose_block(second),
            );
            // A node that already promised the other round refuses to propose.
            for result in [a, b] {
                if let Err(e) = result {
                    assert!(matches!(e, ConsensusError::SlotBusy { .. }), "{e}");
                }
            }
            let snapshots = cluster.settle(Duration::from_secs(5)).await;
            assert!(snapshots.iter().all(|s| s.state == AcceptorState::Idle));

            let mut accepted = Vec::new();
            for (index, rx) in events.iter_mut().enumerate() {
                let mut seen = HashSet::new();
                let mut accepted_here = 0;
                loop {
                    match rx.try_recv() {
                        Ok(ConsensusEvent::RoundFinished {
                            proposal_id,
                            block_hash,
                            outcome,
                            ..
                        }) => {
                            assert!(seen.insert(proposal_id), "round finished twice");
                            if outcome == ProposalOutcome::Accepted {
                                accepted_here += 1;
                                accepted.push((proposal_id, block_hash));
                            }
                        }
                        Ok(ConsensusEvent::Fatal { reason }) => panic!("fatal: {reason}"),
                        Err(TryRecvError::Empty) => break,
                        Err(e) => panic!("event stream: {e}"),
                    }
                }
                assert!(accepted_here <= 1, "node {index} accepted {accepted_here} blocks");
            }

            let before: Vec<_> = cluster
                .nodes
                .iter()
                .map(|node| {
                    let utxos = node.utxos();
                    let to_bob = utxos.contains(&bob_key).unwrap();
                    let to_carol = utxos.contains(&carol_key).unwrap();
                    assert!(!(to_bob && to_carol), "ALICE_1 spent twice");
                    assert_eq!(to_bob || to_carol, !utxos.contains(&ALICE_1).unwrap());
                    dump(utxos.kv().as_ref())
                })
                .collect();

            // Replay the Commit of every accepted round to every node.
            for (proposal_id, block_hash) in &accepted {
                let (header, proposer) = rounds[block_hash].clone();
                let proposal = Proposal {
                    timestamp: header.timestamp,
                    proposal_id: *proposal_id,
                    proposer_id: proposer,
                    block_header: header,
                };
                let bytes = codec::encode(&ConsensusMessage::Commit(proposal)).unwrap();
                for node in &cluster.nodes {
                    node.consensus()
                        .on_consensus_message(proposer, &bytes)
                        .unwrap();
                }
            }
            for node in &cluster.nodes {
                assert_eq!(node.state().await.unwrap().state, AcceptorState::Idle);
            }
            for (node, before) in cluster.nodes.iter().zip(before) {
                assert_eq!(dump(node.utxos().kv().as_ref()), before);
            }
            for rx in &mut events {
                assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
            }

            cluster.shutdown().await;
        }
    }

    // ---------------------------------------------------------------------
    // Fork-join completion
    // ---------------------------------------------------------------------

    fn run_random_tree(engine: &TaskEngine, fail_leaf: Option<usize>) -> (TaskStatus, usize) {
        let mut rng = rand::thread_rng();
        let branches = rng.gen_range(1..6);
        let shape: Vec<Vec<u64>> = (0..branches)
            .map(|_| {
                let leaves = rng.gen_range(1..12);
                (0..leaves).map(|_| rng.gen_range(0..300)).collect()
            })
            .collect();
        let total_leaves: usize = shape.iter().map(Vec::len).sum();
        let failing = fail_leaf.map(|n| n % total_leaves);

        let ran = Arc::new(AtomicUsize::new(0));
        let leaf_counter = Arc::clone(&ran);
        let root = engine.schedule(task_fn("root", move |ctx| {
            let mut leaf_index = 0;
            for delays in shape {
                let first = leaf_index;
                leaf_index += delays.len();
                let ran = Arc::clone(&leaf_counter);
                ctx.fork(task_fn("branch", move |ctx| {
                    for (offset, micros) in delays.into_iter().enumerate() {
                        let ran = Arc::clone(&ran);
                        let fails = failing == Some(first + offset);
                        ctx.fork(task_fn("leaf", move |_| {
                            std::thread::sleep(Duration::from_micros(micros));
                            ran.fetch_add(1, Ordering::SeqCst);
                            if fails {
                                TaskStatus::Failed
                            } else {
                                TaskStatus::Successful
                            }
                        }));
                    }
                    TaskStatus::Successful
                }));
            }
            TaskStatus::Successful
        }));

        let (tx, rx) = mpsc::channel();
        root.on_complete(move |status| {
            tx.send(status).unwrap();
        });
        let status = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
        assert_eq!(root.wait_blocking(), status);
        assert_eq!(ran.load(Ordering::SeqCst), total_leaves);
        (status, total_leaves)
    }

    #[test]
    fn prop_fork_join_notifies_root_exactly_once() {
        for workers in [1, 2, 4, 8] {
            let engine = test_engine(workers);
            for _ in 0..25 {
                let (status, _) = run_random_tree(&engine, None);
                assert_eq!(status, TaskStatus::Successful);
            }
            assert!(engine.shutdown(Duration::from_secs(5)));
        }
    }

    #[test]
    fn prop_one_failing_leaf_fails_the_root() {
        let engine = test_engine(4);
        let mut rng = rand::thread_rng();
        for _ in 0..25 {
            let (status, _) = run_random_tree(&engine, Some(rng.gen_range(0..64)));
            assert_eq!(status, TaskStatus::Failed);
        }
        assert!(engine.shutdown(Duration::from_secs(5)));
    }

    // ---------------------------------------------------------------------
    // Atomic commit
    // ---------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn prop_failing_commit_leaf_writes_nothing() {
        let (kv, utxos) = seeded_store();
        let pipeline = BlockPipeline::new(test_engine(4), utxos);
        let before = dump(kv.as_ref());

        // Valid spends first; the last input was never minted.
        let candidate = Arc::new(block(
            1,
            vec![
                transfer(1, &[(ALICE_1, "alice")], &[("bob", "widget")]),
                transfer(2, &[(ALICE_2, "alice")], &[("carol", "gadget")]),
                transfer(3, &[([0xEE; 32], "alice")], &[("dave", "gizmo")]),
            ],
        ));

        let err = pipeline.stage_commit(Arc::clone(&candidate)).await.unwrap_err();
        assert!(matches!(err, PipelineError::CommitFailed { .. }));
        assert_eq!(dump(kv.as_ref()), before);

        let err = pipeline.commit_block(candidate).await.unwrap_err();
        assert!(matches!(err, PipelineError::VerificationFailed { .. }));
        assert_eq!(dump(kv.as_ref()), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn prop_failing_flush_writes_nothing() {
        let faulty = Arc::new(FaultyKVStore::new());
        let utxos = UtxoStore::new(faulty.clone());
        utxos.seed(genesis()).unwrap();
        let pipeline = BlockPipeline::new(test_engine(4), utxos);
        let before = dump(faulty.inner());

        let candidate = Arc::new(block(
            1,
            vec![transfer(
                1,
                &[(ALICE_1, "alice"), (ALICE_2, "alice")],
                &[("bob", "widget"), ("carol", "gadget")],
            )],
        ));

        faulty.set_fail_batches(true);
        let err = pipeline.commit_block(Arc::clone(&candidate)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert_eq!(dump(faulty.inner()), before);

        faulty.set_fail_batches(false);
        pipeline.commit_block(candidate).await.unwrap();
        assert_ne!(dump(faulty.inner()), before);
    }

    // ---------------------------------------------------------------------
    // Idempotent rejection
    // ---------------------------------------------------------------------

    fn sorted_reasons(result: Result<(), PipelineError>) -> Option<Vec<String>> {
        match result {
            Ok(()) => None,
            Err(PipelineError::VerificationFailed { mut reasons, .. }) => {
                reasons.sort();
                Some(reasons)
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn prop_verification_is_repeatable() {
        let (kv, utxos) = seeded_store();
        let pipeline = BlockPipeline::new(test_engine(4), utxos);
        let before = dump(kv.as_ref());
        let mut rng = rand::thread_rng();

        let owners = ["alice", "mallory"];
        let inputs = [ALICE_1, ALICE_2, [0xEE; 32]];
        for height in 0..40 {
            let txs = (0..rng.gen_range(1..4))
                .map(|nonce| {
                    let input = inputs[rng.gen_range(0..inputs.len())];
                    let owner = owners[rng.gen_range(0..owners.len())];
                    transfer(nonce, &[(input, owner)], &[("bob", "widget")])
                })
                .collect();
            let candidate = Arc::new(block(height, txs));

            let first = sorted_reasons(pipeline.verify(Arc::clone(&candidate)).await);
            let second = sorted_reasons(pipeline.verify(candidate).await);
            assert_eq!(first, second);
            assert_eq!(dump(kv.as_ref()), before);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn prop_rejected_block_is_rejected_again() {
        let cluster = TestCluster::start(3, 2_000).unwrap();
        let forged = block(1, vec![transfer(1, &[(ALICE_1, "mallory")], &[("mallory", "widget")])]);
        let before: Vec<_> = cluster
            .nodes
            .iter()
            .map(|node| dump(node.utxos().kv().as_ref()))
            .collect();

        for _ in 0..2 {
            cluster.register_everywhere(&forged);
            assert_eq!(
                cluster.node(0).propose_block(forged.clone()).await.unwrap(),
                ProposalOutcome::Rejected
            );
            cluster.settle(Duration::from_secs(5)).await;
        }
        for (node, before) in cluster.nodes.iter().zip(before) {
            assert_eq!(dump(node.utxos().kv().as_ref()), before);
        }
        assert!(!cluster.node(0).pending_blocks().contains(&forged.hash()));
        cluster.shutdown().await;
    }
}
