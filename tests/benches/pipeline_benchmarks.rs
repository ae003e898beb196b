//! # Quorum-Ledger Pipeline Benchmarks
//!
//! Run all:
//! ```bash
//! cargo bench --package ql-tests --bench pipeline_benchmarks
//! ```
//!
//! Run one group:
//! ```bash
//! cargo bench --package ql-tests --bench pipeline_benchmarks -- ql-04/codec
//! ```
//!
//! | Group | What is measured |
//! |-------|------------------|
//! | ql-04/codec | encode and decode of one consensus message |
//! | ql-02/fork_join | a root with N trivial leaves, end to end |
//! | ql-03/verify | verification tree over a block of N transfers |
//! | ql-03/commit | stage and flush of the same block on a fresh ledger |

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use ql_01_ledger_storage::{InMemoryKVStore, UtxoStore};
use ql_02_task_engine::{task_fn, EngineConfig, TaskEngine, TaskStatus};
use ql_03_block_pipeline::BlockPipeline;
use ql_04_consensus::{codec, ConsensusMessage, MessageKind, Proposal, WireHints};
use ql_tests::fixtures::{block, transfer};
use shared_types::{Block, Hash, NodeId, TransactionReference, UnspentOutputRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const SIZES: [usize; 3] = [1, 16, 128];

fn output(i: usize) -> Hash {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&(i as u64).to_be_bytes());
    hash
}

/// A ledger holding `n` outputs owned by alice, and a block spending all of them.
fn wide_block(n: usize) -> (Vec<(Hash, UnspentOutputRecord)>, Block) {
    let minted_by = TransactionReference([0x01; 32]);
    let genesis = (0..n)
        .map(|i| (output(i), UnspentOutputRecord::new(minted_by, "alice", "widget")))
        .collect();
    let txs = (0..n)
        .map(|i| transfer(i as u64, &[(output(i), "alice")], &[("bob", "widget")]))
        .collect();
    (genesis, block(1, txs))
}

fn fresh_pipeline(engine: &TaskEngine, genesis: &[(Hash, UnspentOutputRecord)]) -> BlockPipeline {
    let utxos = UtxoStore::new(Arc::new(InMemoryKVStore::new()));
    utxos
        .seed(genesis.iter().cloned())
        .expect("seeding an in-memory store cannot fail");
    BlockPipeline::new(engine.clone(), utxos)
}

fn engine() -> TaskEngine {
    TaskEngine::new(EngineConfig::default()).expect("engine")
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("ql-04/codec");
    let header = block(1, vec![]).header;
    let message = ConsensusMessage::new(
        MessageKind::Commit,
        Proposal::new(NodeId::from_u128(7), header, 1_700_000_000_000),
    );
    let bytes = codec::encode(&message).expect("encode");
    let hints = WireHints::default().with_kind(MessageKind::Commit);
    let hinted = codec::encode_with(&message, hints).expect("encode");

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| codec::encode(black_box(&message)).expect("encode"))
    });
    group.bench_function("decode", |b| {
        b.iter(|| codec::decode(black_box(&bytes)).expect("decode"))
    });
    group.bench_function("decode_hinted", |b| {
        b.iter(|| codec::decode_with(black_box(&hinted), hints).expect("decode"))
    });
    group.finish();
}

fn bench_fork_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("ql-02/fork_join");
    let engine = engine();
    for leaves in [1usize, 64, 1024] {
        group.throughput(Throughput::Elements(leaves as u64));
        group.bench_with_input(BenchmarkId::from_parameter(leaves), &leaves, |b, &leaves| {
            b.iter(|| {
                let root = engine.schedule(task_fn("root", move |ctx| {
                    for _ in 0..leaves {
                        ctx.fork(task_fn("leaf", |_| TaskStatus::Successful));
                    }
                    TaskStatus::Successful
                }));
                assert_eq!(root.wait_blocking(), TaskStatus::Successful);
            })
        });
    }
    group.finish();
    engine.shutdown(Duration::from_secs(5));
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("ql-03/verify");
    let rt = Runtime::new().expect("runtime");
    let engine = engine();
    for n in SIZES {
        let (genesis, candidate) = wide_block(n);
        let pipeline = fresh_pipeline(&engine, &genesis);
        let candidate = Arc::new(candidate);

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &candidate, |b, candidate| {
            b.iter(|| {
                rt.block_on(pipeline.verify(Arc::clone(candidate)))
                    .expect("valid block")
            })
        });
    }
    group.finish();
    engine.shutdown(Duration::from_secs(5));
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ql-03/commit");
    let rt = Runtime::new().expect("runtime");
    let engine = engine();
    for n in SIZES {
        let (genesis, candidate) = wide_block(n);
        let candidate = Arc::new(candidate);

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &candidate, |b, candidate| {
            b.iter_batched(
                || fresh_pipeline(&engine, &genesis),
                |pipeline| {
                    rt.block_on(async {
                        let staged = pipeline.stage_commit(Arc::clone(candidate)).await?;
                        pipeline.flush(staged)
                    })
                    .expect("commit")
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
    engine.shutdown(Duration::from_secs(5));
}

criterion_group!(
    name = pipeline_benches;
    config = Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(5));
    targets = bench_codec, bench_fork_join, bench_verify, bench_commit,
);

criterion_main!(pipeline_benches);
