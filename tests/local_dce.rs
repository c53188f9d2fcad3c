//! Local dead code elimination integration tests.
//!
//! These tests drive `LocalDce` through the public API:
//! 1. Build an instruction stream with `IrCode`
//! 2. Turn it into a `ControlFlowGraph`
//! 3. Run DCE with a purity oracle
//! 4. Check the statistics and the linearized result

use std::collections::HashSet;

use dexflow::{
    compiler::{AssumeNoSideEffects, DceStats, LocalDce, NoPureMethods, PurityOracle},
    ir::{dasm::*, IrCode, IrInstruction, IrOpcode, MethodRef, RefPool},
    ControlFlowGraph, Result,
};

fn run_dce(
    code: &IrCode,
    oracle: &dyn PurityOracle,
    pure: &HashSet<MethodRef>,
) -> Result<(ControlFlowGraph, DceStats)> {
    let mut cfg = ControlFlowGraph::build(code)?;
    let stats = LocalDce::new(oracle, pure).dce(&mut cfg);
    Ok((cfg, stats))
}

fn opcodes(cfg: &ControlFlowGraph) -> Vec<IrOpcode> {
    cfg.linearize()
        .instructions()
        .map(IrInstruction::opcode)
        .collect()
}

#[test]
fn straight_line_dead_constant() -> Result<()> {
    let mut code = IrCode::new();
    code.push(dasm_lit(IrOpcode::Const, &[0], 1));
    code.push(dasm_lit(IrOpcode::Const, &[1], 2));
    code.push(dasm(IrOpcode::Return, &[1]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 1);
    assert_eq!(stats.unreachable_instruction_count, 0);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::Const, IrOpcode::Return]);
    assert_eq!(cfg.registers_size(), 2);
    Ok(())
}

#[test]
fn dead_branch_is_elided() -> Result<()> {
    // both arms of the `if` land on the same block
    let mut code = IrCode::new();
    let join = code.new_label();
    code.push(dasm_lit(IrOpcode::Const, &[0], 0));
    code.push_branch(dasm(IrOpcode::IfEqz, &[0]), join);
    code.bind(join);
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 2);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::ReturnVoid]);
    assert_eq!(cfg.registers_size(), 0);
    Ok(())
}

#[test]
fn live_branch_is_kept() -> Result<()> {
    let mut code = IrCode::new();
    let other = code.new_label();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push_branch(dasm(IrOpcode::IfEqz, &[0]), other);
    code.push(dasm(IrOpcode::ReturnVoid, &[]));
    code.bind(other);
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.total(), 0);
    assert_eq!(cfg.num_instructions(), 4);
    Ok(())
}

#[test]
fn loop_keeps_counter_and_drops_scratch() -> Result<()> {
    let mut code = IrCode::new();
    let head = code.new_label();
    let exit = code.new_label();
    code.push(dasm_lit(IrOpcode::Const, &[0], 0));
    code.push(dasm_lit(IrOpcode::Const, &[1], 10));
    code.push(dasm_lit(IrOpcode::Const, &[2], 5));
    code.bind(head);
    code.push_branch(dasm(IrOpcode::IfGe, &[0, 1]), exit);
    code.push(dasm_lit(IrOpcode::AddIntLit, &[0, 0], 1));
    code.push(dasm(IrOpcode::MulInt, &[3, 0, 0]));
    code.push_goto(head);
    code.bind(exit);
    code.push(dasm(IrOpcode::Return, &[0]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 2);
    assert!(cfg
        .instructions()
        .all(|(_, insn)| insn.opcode() != IrOpcode::MulInt));
    assert_eq!(
        cfg.instructions()
            .filter(|(_, insn)| insn.opcode() == IrOpcode::Const)
            .count(),
        2
    );
    assert_eq!(cfg.registers_size(), 2);
    Ok(())
}

#[test]
fn value_live_around_back_edge_is_kept() -> Result<()> {
    // v2 is only read on the next trip around the loop
    let mut code = IrCode::new();
    let head = code.new_label();
    let exit = code.new_label();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm_lit(IrOpcode::Const, &[2], 0));
    code.bind(head);
    code.push_branch(dasm(IrOpcode::IfEqz, &[0]), exit);
    code.push(dasm(IrOpcode::AddInt, &[1, 2, 0]));
    code.push(dasm_lit(IrOpcode::AddIntLit, &[2, 1], 1));
    code.push(dasm_lit(IrOpcode::AddIntLit, &[0, 0], -1));
    code.push_goto(head);
    code.bind(exit);
    code.push(dasm(IrOpcode::Return, &[2]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.total(), 0);
    assert_eq!(cfg.num_instructions(), 7);
    Ok(())
}

#[test]
fn unused_pure_invoke_is_removed() -> Result<()> {
    let pool = RefPool::new();
    let abs = pool.method("Ljava/lang/Math;", "abs", "(I)I")?;
    let mut code = IrCode::new();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm_method(IrOpcode::InvokeStatic, abs, &[0]));
    code.push(dasm(IrOpcode::MoveResult, &[1]));
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let oracle = AssumeNoSideEffects::java_lang_defaults(&pool);
    let (cfg, stats) = run_dce(&code, &oracle, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 2);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::LoadParam, IrOpcode::ReturnVoid]);
    Ok(())
}

#[test]
fn used_pure_invoke_is_kept() -> Result<()> {
    let pool = RefPool::new();
    let abs = pool.method("Ljava/lang/Math;", "abs", "(I)I")?;
    let mut code = IrCode::new();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm_method(IrOpcode::InvokeStatic, abs, &[0]));
    code.push(dasm(IrOpcode::MoveResult, &[1]));
    code.push(dasm(IrOpcode::Return, &[1]));

    let oracle = AssumeNoSideEffects::java_lang_defaults(&pool);
    let (_, stats) = run_dce(&code, &oracle, &HashSet::new())?;
    assert_eq!(stats.total(), 0);
    Ok(())
}

#[test]
fn impure_invoke_keeps_call_but_loses_result_move() -> Result<()> {
    let pool = RefPool::new();
    let bar = pool.method("LFoo;", "bar", "()I")?;
    let mut code = IrCode::new();
    code.push(dasm_method(IrOpcode::InvokeStatic, bar.clone(), &[]));
    code.push(dasm(IrOpcode::MoveResult, &[0]));
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 1);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::InvokeStatic, IrOpcode::ReturnVoid]);

    // the same call goes away once the caller vouches for it
    let pure: HashSet<MethodRef> = [bar].into_iter().collect();
    let (cfg, stats) = run_dce(&code, &NoPureMethods, &pure)?;
    assert_eq!(stats.dead_instruction_count, 2);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::ReturnVoid]);
    Ok(())
}

#[test]
fn switch_to_fallthrough_only_is_removed() -> Result<()> {
    let mut code = IrCode::new();
    let next = code.new_label();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push_switch(dasm(IrOpcode::Switch, &[0]), [(1, next), (2, next)]);
    code.bind(next);
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 1);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::LoadParam, IrOpcode::ReturnVoid]);
    Ok(())
}

#[test]
fn switch_with_real_case_is_kept() -> Result<()> {
    let mut code = IrCode::new();
    let next = code.new_label();
    let case = code.new_label();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push_switch(dasm(IrOpcode::Switch, &[0]), [(1, next), (2, case)]);
    code.bind(next);
    code.push(dasm(IrOpcode::ReturnVoid, &[]));
    code.bind(case);
    code.push(dasm_lit(IrOpcode::Const, &[0], 7));
    code.push(dasm(IrOpcode::Return, &[0]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.total(), 0);
    assert_eq!(cfg.num_instructions(), 5);
    Ok(())
}

#[test]
fn unreachable_blocks_are_counted() -> Result<()> {
    let mut code = IrCode::new();
    let end = code.new_label();
    code.push_goto(end);
    code.push(dasm_lit(IrOpcode::Const, &[1], 1));
    code.push(dasm(IrOpcode::Return, &[1]));
    code.bind(end);
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.dead_instruction_count, 0);
    assert_eq!(stats.unreachable_instruction_count, 2);
    assert_eq!(opcodes(&cfg), vec![IrOpcode::ReturnVoid]);
    assert_eq!(cfg.registers_size(), 0);
    Ok(())
}

#[test]
fn side_effects_are_kept() -> Result<()> {
    let pool = RefPool::new();
    let field = pool.field("LFoo;", "x", "I");
    let mut code = IrCode::new();
    code.push(dasm_lit(IrOpcode::Const, &[0], 3));
    code.push(dasm_field(IrOpcode::Sput, field, &[0]));
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let (cfg, stats) = run_dce(&code, &NoPureMethods, &HashSet::new())?;
    assert_eq!(stats.total(), 0);
    assert_eq!(cfg.num_instructions(), 3);
    Ok(())
}

#[test]
fn second_run_finds_nothing() -> Result<()> {
    let mut code = IrCode::new();
    code.push(dasm_lit(IrOpcode::Const, &[0], 1));
    code.push(dasm(IrOpcode::AddInt, &[1, 0, 0]));
    code.push(dasm(IrOpcode::ReturnVoid, &[]));

    let pure = HashSet::new();
    let mut cfg = ControlFlowGraph::build(&code)?;
    let dce = LocalDce::new(&NoPureMethods, &pure);
    assert_eq!(dce.dce(&mut cfg).dead_instruction_count, 2);
    assert_eq!(dce.dce(&mut cfg), DceStats::default());
    Ok(())
}
