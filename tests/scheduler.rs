//! Pass scheduling integration tests.
//!
//! These tests configure a `PassScheduler` through `OptimizerConfig`, run it over a set
//! of methods and check the edited graphs together with the event log.

use std::collections::HashMap;

use dexflow::{
    compiler::{EventKind, EventLog, MethodBody, OptimizerConfig, PassScheduler},
    ir::{dasm::*, IrCode, IrOpcode, MethodRef, RefPool},
    ControlFlowGraph, Result,
};

fn calls_id(pool: &RefPool, name: &str, id: &MethodRef) -> Result<MethodBody> {
    let method = pool.method("LMain;", name, "(I)I")?;
    let mut code = IrCode::new();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm_method(IrOpcode::InvokeStatic, id.clone(), &[0]));
    code.push(dasm(IrOpcode::MoveResult, &[1]));
    code.push(dasm_lit(IrOpcode::Const, &[2], 9));
    code.push(dasm(IrOpcode::Return, &[1]));
    MethodBody::from_code(method, &code)
}

fn identity(pool: &RefPool) -> Result<(MethodRef, ControlFlowGraph)> {
    let method = pool.method("LUtil;", "id", "(I)I")?;
    let mut code = IrCode::new();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm(IrOpcode::Return, &[0]));
    Ok((method, ControlFlowGraph::build(&code)?))
}

#[test]
fn default_config_only_removes_dead_code() -> Result<()> {
    let pool = RefPool::new();
    let (id, _) = identity(&pool)?;
    let mut methods = vec![calls_id(&pool, "a", &id)?, calls_id(&pool, "b", &id)?];

    let scheduler =
        PassScheduler::from_config(&OptimizerConfig::default(), &pool, HashMap::new())?;
    let events = EventLog::new();
    let iterations = scheduler.run(&mut methods, &events)?;

    assert_eq!(iterations, 2);
    let stats = events.stats();
    assert_eq!(stats.dead_instructions, 2);
    assert_eq!(stats.inlined_call_sites, 0);
    for body in &methods {
        assert_eq!(body.cfg.num_instructions(), 4);
        assert!(body
            .cfg
            .instructions()
            .any(|(_, insn)| insn.opcode() == IrOpcode::InvokeStatic));
    }
    Ok(())
}

#[test]
fn aggressive_config_inlines_then_cleans_up() -> Result<()> {
    let pool = RefPool::new();
    let (id, id_cfg) = identity(&pool)?;
    let mut methods: Vec<MethodBody> = (0..4)
        .map(|i| calls_id(&pool, &format!("m{i}"), &id))
        .collect::<Result<_>>()?;
    let callees: HashMap<MethodRef, ControlFlowGraph> =
        [(id.clone(), id_cfg)].into_iter().collect();

    let scheduler = PassScheduler::from_config(&OptimizerConfig::aggressive(), &pool, callees)?;
    let names: Vec<&str> = scheduler.passes().iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["inline", "local-dce"]);

    let events = EventLog::new();
    scheduler.run(&mut methods, &events)?;

    assert_eq!(events.count(EventKind::CallSiteInlined), 4);
    assert_eq!(events.count(EventKind::DeadCodeEliminated), 4);
    for body in &methods {
        assert!(body
            .cfg
            .instructions()
            .all(|(_, insn)| !insn.opcode().is_invoke()));
    }

    let inlined = events
        .iter()
        .find(|e| e.kind == EventKind::CallSiteInlined)
        .and_then(|e| e.message.clone());
    assert_eq!(inlined, Some(id.to_string()));
    Ok(())
}

#[test]
fn oversized_callees_are_not_inlined() -> Result<()> {
    let pool = RefPool::new();
    let (id, id_cfg) = identity(&pool)?;
    let mut methods = vec![calls_id(&pool, "a", &id)?];
    let callees = [(id, id_cfg)].into_iter().collect();

    let config = OptimizerConfig::fast().with_inlining(true, 1);
    let scheduler = PassScheduler::from_config(&config, &pool, callees)?;
    let events = EventLog::new();
    scheduler.run(&mut methods, &events)?;

    assert_eq!(events.count(EventKind::CallSiteInlined), 0);
    assert_eq!(events.count(EventKind::DeadCodeEliminated), 1);
    Ok(())
}

#[test]
fn configured_pure_methods_are_honoured() -> Result<()> {
    let pool = RefPool::new();
    let (id, _) = identity(&pool)?;
    let mut methods = vec![calls_id(&pool, "a", &id)?];
    // the result of the call is returned, so only an unused call can go
    let method = pool.method("LMain;", "b", "(I)V")?;
    let mut code = IrCode::new();
    code.push(dasm(IrOpcode::LoadParam, &[0]));
    code.push(dasm_method(IrOpcode::InvokeStatic, id.clone(), &[0]));
    code.push(dasm(IrOpcode::MoveResult, &[1]));
    code.push(dasm(IrOpcode::ReturnVoid, &[]));
    methods.push(MethodBody::from_code(method, &code)?);

    let config = OptimizerConfig::fast().with_pure_methods([id.to_string()]);
    let scheduler = PassScheduler::from_config(&config, &pool, HashMap::new())?;
    scheduler.run(&mut methods, &EventLog::new())?;

    assert_eq!(methods[0].cfg.num_instructions(), 4);
    assert_eq!(methods[1].cfg.num_instructions(), 2);
    Ok(())
}

#[test]
fn sequential_and_parallel_agree() -> Result<()> {
    let pool = RefPool::new();
    let (id, _) = identity(&pool)?;
    let build = || -> Result<Vec<MethodBody>> {
        (0..16)
            .map(|i| calls_id(&pool, &format!("m{i}"), &id))
            .collect()
    };

    let mut sequential = build()?;
    let mut parallel = build()?;
    PassScheduler::from_config(&OptimizerConfig::fast(), &pool, HashMap::new())?
        .run(&mut sequential, &EventLog::new())?;
    PassScheduler::from_config(&OptimizerConfig::default(), &pool, HashMap::new())?
        .run(&mut parallel, &EventLog::new())?;

    for (s, p) in sequential.iter().zip(&parallel) {
        assert_eq!(s.method, p.method);
        assert_eq!(s.cfg.to_string(), p.cfg.to_string());
    }
    Ok(())
}
