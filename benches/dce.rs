#![allow(unused)]
extern crate dexflow;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dexflow::{
    compiler::{LocalDce, NoPureMethods},
    ir::{dasm::*, IrCode, IrOpcode},
    ControlFlowGraph,
};
use std::{collections::HashSet, hint::black_box};

/// Builds a method made of `loops` consecutive counting loops.
///
/// Every loop body carries one live accumulator update and one dead scratch
/// multiplication, so each DCE run has real work to do in every block.
fn nested_loops(loops: usize) -> IrCode {
    let mut code = IrCode::new();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm_lit(IrOpcode::Const, &[1], 0));
    for _ in 0..loops {
        let head = code.new_label();
        let exit = code.new_label();
        code.push(dasm(IrOpcode::Move, &[2, 0]));
        code.bind(head);
        code.push_branch(dasm(IrOpcode::IfLez, &[2]), exit);
        code.push(dasm(IrOpcode::AddInt, &[1, 1, 2]));
        code.push(dasm(IrOpcode::MulInt, &[3, 2, 2]));
        code.push(dasm_lit(IrOpcode::AddIntLit, &[2, 2], -1));
        code.push_goto(head);
        code.bind(exit);
    }
    code.push(dasm(IrOpcode::Return, &[1]));
    code
}

/// Benchmark local DCE over methods with a growing number of loops
///
/// The graph is cloned for every iteration so each run starts from the same
/// unoptimized input.
fn bench_local_dce(c: &mut Criterion) {
    let pure = HashSet::new();
    let dce = LocalDce::new(&NoPureMethods, &pure);

    let mut group = c.benchmark_group("local_dce");
    for loops in [4usize, 32, 128] {
        let cfg = ControlFlowGraph::build(&nested_loops(loops)).unwrap();
        group.throughput(Throughput::Elements(cfg.num_instructions() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(loops), &cfg, |b, cfg| {
            b.iter(|| {
                let mut cfg = cfg.clone();
                black_box(dce.dce(black_box(&mut cfg)))
            });
        });
    }
    group.finish();
}

/// Benchmark building and linearizing the same methods
fn bench_build_linearize(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_linearize");
    for loops in [4usize, 32, 128] {
        let code = nested_loops(loops);
        group.bench_with_input(BenchmarkId::from_parameter(loops), &code, |b, code| {
            b.iter(|| {
                let cfg = ControlFlowGraph::build(black_box(code)).unwrap();
                black_box(cfg.linearize())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_local_dce, bench_build_linearize);
criterion_main!(benches);
