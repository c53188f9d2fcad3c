//! Local Dead Code Elimination.
//!
//! Removes instructions whose results are never observed, using a backwards liveness
//! analysis over the registers of one method.
//!
//! # Algorithm
//!
//! Every block carries a live-in bit vector of `registers_size + 1` bits. The extra bit
//! stands for the pending result of an invoke, `filled-new-array` or any instruction
//! whose value is picked up by a `move-result-pseudo*`.
//!
//! 1. Visit blocks in postorder. Live-out is the union of the successors' live-in.
//! 2. Walk the block backwards. A required instruction kills its destination (and the
//!    result bit if it produces one) and then makes its sources live; a result move makes
//!    the result bit live. Anything not required is dead.
//! 3. Repeat until no live-in vector changes. Vectors only grow, so this terminates.
//! 4. Delete the dead instructions, then every block the entry no longer reaches.
//!
//! Side-effecting opcodes are always required, with three exceptions: invokes of
//! side-effect free methods (required only if their result is used), and conditional
//! branches or switches whose every target equals the fallthrough.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    ops::AddAssign,
    sync::Arc,
};

use tracing::{debug, trace};

use crate::{
    analysis::{BlockId, ControlFlowGraph, EdgeType, InsnId},
    compiler::{
        pass::{CfgPass, MethodBody},
        purity::PurityOracle,
        EventKind, EventLog,
    },
    ir::{IrInstruction, MethodRef},
    utils::BitSet,
    Result,
};

/// Counts reported by one DCE run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DceStats {
    /// Instructions found dead. A `move-result*` counts on its own; a
    /// `move-result-pseudo*` goes with its primary and is not counted.
    pub dead_instruction_count: usize,
    /// Instructions deleted with the blocks that became unreachable.
    pub unreachable_instruction_count: usize,
}

impl DceStats {
    /// Total number of instructions removed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.dead_instruction_count + self.unreachable_instruction_count
    }
}

impl AddAssign for DceStats {
    fn add_assign(&mut self, rhs: Self) {
        self.dead_instruction_count += rhs.dead_instruction_count;
        self.unreachable_instruction_count += rhs.unreachable_instruction_count;
    }
}

/// Liveness-based dead code elimination over one graph.
///
/// # Examples
///
/// ```rust
/// use std::collections::HashSet;
///
/// use dexflow::{
///     compiler::{LocalDce, NoPureMethods},
///     ir::{dasm::*, IrCode, IrOpcode},
///     ControlFlowGraph,
/// };
///
/// let mut code = IrCode::new();
/// code.push(dasm_lit(IrOpcode::Const, &[0], 1));
/// code.push(dasm_lit(IrOpcode::Const, &[1], 2));
/// code.push(dasm(IrOpcode::Return, &[0]));
/// let mut cfg = ControlFlowGraph::build(&code)?;
///
/// let pure = HashSet::new();
/// let stats = LocalDce::new(&NoPureMethods, &pure).dce(&mut cfg);
/// assert_eq!(stats.dead_instruction_count, 1);
/// assert_eq!(cfg.registers_size(), 1);
/// # Ok::<(), dexflow::Error>(())
/// ```
pub struct LocalDce<'a> {
    oracle: &'a dyn PurityOracle,
    pure_methods: &'a HashSet<MethodRef>,
}

impl<'a> LocalDce<'a> {
    /// Combines `oracle` with the caller's own set of side-effect free methods.
    #[must_use]
    pub fn new(oracle: &'a dyn PurityOracle, pure_methods: &'a HashSet<MethodRef>) -> Self {
        LocalDce {
            oracle,
            pure_methods,
        }
    }

    /// Runs the analysis and deletes everything found dead.
    ///
    /// # Panics
    ///
    /// Panics if a block ending in a conditional branch or switch lacks its `Goto` or
    /// `Branch` successor.
    pub fn dce(&self, cfg: &mut ControlFlowGraph) -> DceStats {
        trace!(target: "dexflow::dce", "before dce:\n{cfg}");
        cfg.recompute_registers_size();

        let dead = self.find_dead(cfg);
        let mut stats = DceStats {
            dead_instruction_count: dead.len(),
            ..DceStats::default()
        };
        for id in dead {
            // removing a primary may already have taken its result move along
            if cfg.find_insn(id).is_none() {
                continue;
            }
            if let Some(insn) = cfg.insn(id) {
                debug!(target: "dexflow::dce", insn = %id, "removing dead {insn}");
            }
            cfg.remove_insn(id);
        }
        stats.unreachable_instruction_count = cfg.remove_unreachable_blocks();
        cfg.recompute_registers_size();

        trace!(target: "dexflow::dce", "after dce:\n{cfg}");
        stats
    }

    fn find_dead(&self, cfg: &ControlFlowGraph) -> BTreeSet<InsnId> {
        let regs = cfg.registers_size() as usize;
        let order = cfg.blocks_post();
        let mut live_in: HashMap<BlockId, BitSet> = order
            .iter()
            .map(|&block| (block, BitSet::new(regs + 1)))
            .collect();
        let mut dead = BTreeSet::new();

        loop {
            dead.clear();
            let mut changed = false;

            for &block in &order {
                let mut live = BitSet::new(regs + 1);
                for succ in cfg.successors(block) {
                    if let Some(succ_live) = live_in.get(&succ) {
                        live.union_with(succ_live);
                    }
                }

                let Some(b) = cfg.block(block) else {
                    continue;
                };
                for (id, insn) in b.instructions().rev() {
                    if self.is_required(cfg, block, insn, &live) {
                        Self::update_liveness(insn, &mut live, regs);
                    } else if !insn.opcode().is_move_result_pseudo() {
                        dead.insert(id);
                    }
                }

                trace!(target: "dexflow::dce", %block, live = %live, "live-in");
                if live_in.get(&block) != Some(&live) {
                    live_in.insert(block, live);
                    changed = true;
                }
            }

            if !changed {
                return dead;
            }
        }
    }

    fn update_liveness(insn: &IrInstruction, live: &mut BitSet, result_slot: usize) {
        let opcode = insn.opcode();
        if let Some(dest) = insn.dest() {
            live.remove(dest as usize);
            if insn.dest_is_wide() {
                live.remove(dest as usize + 1);
            }
        }
        if opcode.is_invoke() || opcode.is_filled_new_array() || opcode.has_move_result_pseudo() {
            live.remove(result_slot);
        }
        for (i, &src) in insn.srcs().iter().enumerate() {
            live.insert(src as usize);
            if insn.src_is_wide(i) {
                live.insert(src as usize + 1);
            }
        }
        if opcode.is_move_result_any() {
            live.insert(result_slot);
        }
    }

    fn is_required(
        &self,
        cfg: &ControlFlowGraph,
        block: BlockId,
        insn: &IrInstruction,
        live: &BitSet,
    ) -> bool {
        let opcode = insn.opcode();
        let result_slot = live.len() - 1;

        if opcode.has_side_effects() {
            if opcode.is_invoke() {
                let method = insn.get_method();
                if self.is_pure(method) {
                    return live.contains(result_slot);
                }
                return true;
            }
            if opcode.is_conditional_branch() {
                let goto = unique_target(cfg, block, EdgeType::Goto);
                let branch = unique_target(cfg, block, EdgeType::Branch);
                return goto != branch;
            }
            if opcode.is_switch() {
                let goto = unique_target(cfg, block, EdgeType::Goto);
                return cfg
                    .get_succ_edges_of_type(block, EdgeType::Branch)
                    .into_iter()
                    .filter_map(|e| cfg.edge(e))
                    .any(|e| e.target() != goto);
            }
            return true;
        }

        if let Some(dest) = insn.dest() {
            let dest = dest as usize;
            return live.contains(dest) || (insn.dest_is_wide() && live.contains(dest + 1));
        }
        if opcode.is_filled_new_array() || opcode.has_move_result_pseudo() {
            return live.contains(result_slot);
        }
        false
    }

    fn is_pure(&self, method: &MethodRef) -> bool {
        self.pure_methods.contains(method) || self.oracle.is_side_effect_free(method)
    }
}

fn unique_target(cfg: &ControlFlowGraph, block: BlockId, ty: EdgeType) -> BlockId {
    cfg.get_succ_edge_of_type(block, ty)
        .and_then(|e| cfg.edge(e))
        .map(|e| e.target())
        .unwrap_or_else(|| panic!("{block} ends in a branch but has no {ty:?} successor"))
}

/// [`LocalDce`] as a schedulable pass.
pub struct LocalDcePass {
    oracle: Arc<dyn PurityOracle>,
    pure_methods: HashSet<MethodRef>,
}

impl LocalDcePass {
    /// Creates the pass with a purity oracle and additional pure methods.
    #[must_use]
    pub fn new(oracle: Arc<dyn PurityOracle>, pure_methods: HashSet<MethodRef>) -> Self {
        Self {
            oracle,
            pure_methods,
        }
    }
}

impl CfgPass for LocalDcePass {
    fn name(&self) -> &'static str {
        "local-dce"
    }

    fn description(&self) -> &'static str {
        "Removes instructions whose results are never used and blocks that became unreachable"
    }

    fn run_on_method(&self, body: &mut MethodBody, events: &EventLog) -> Result<bool> {
        let stats = LocalDce::new(self.oracle.as_ref(), &self.pure_methods).dce(&mut body.cfg);

        for _ in 0..stats.dead_instruction_count {
            events
                .record(EventKind::DeadCodeEliminated)
                .method(&body.method);
        }
        if stats.unreachable_instruction_count > 0 {
            events
                .record(EventKind::UnreachableCodeRemoved)
                .method(&body.method)
                .message(format!(
                    "{} instructions in unreachable blocks",
                    stats.unreachable_instruction_count
                ));
        }
        Ok(stats.total() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::purity::NoPureMethods,
        ir::{dasm::*, IrCode, IrOpcode, RefPool},
    };

    fn run(cfg: &mut ControlFlowGraph) -> DceStats {
        let pure = HashSet::new();
        LocalDce::new(&NoPureMethods, &pure).dce(cfg)
    }

    #[test]
    fn wide_destinations_count_both_halves() {
        let mut code = IrCode::new();
        code.push(dasm_lit(IrOpcode::ConstWide, &[0], 1));
        code.push(dasm(IrOpcode::LongToInt, &[2, 0]));
        code.push(dasm(IrOpcode::Return, &[2]));
        let mut cfg = ControlFlowGraph::build(&code).unwrap();
        assert_eq!(run(&mut cfg).total(), 0);
        assert_eq!(cfg.num_instructions(), 3);
    }

    #[test]
    fn dead_pseudo_pair_goes_together_and_counts_once() {
        let pool = RefPool::new();
        let mut code = IrCode::new();
        code.push(dasm(IrOpcode::LoadParam, &[0]));
        code.push(dasm(IrOpcode::DivIntLit, &[0]).with_literal(3));
        code.push(dasm(IrOpcode::MoveResultPseudo, &[1]));
        code.push(dasm_string(IrOpcode::ConstString, pool.string("unused"), &[]));
        code.push(dasm(IrOpcode::MoveResultPseudoObject, &[2]));
        code.push(dasm(IrOpcode::ReturnVoid, &[]));
        let mut cfg = ControlFlowGraph::build(&code).unwrap();

        // four instructions go, but only the two primaries are counted
        let stats = run(&mut cfg);
        assert_eq!(stats.dead_instruction_count, 2);
        assert_eq!(cfg.num_instructions(), 2);
        assert_eq!(cfg.registers_size(), 1);
    }

    #[test]
    fn stats_accumulate() {
        let mut total = DceStats::default();
        total += DceStats {
            dead_instruction_count: 2,
            unreachable_instruction_count: 1,
        };
        total += DceStats {
            dead_instruction_count: 1,
            unreachable_instruction_count: 0,
        };
        assert_eq!(total.dead_instruction_count, 3);
        assert_eq!(total.total(), 4);
    }
}
