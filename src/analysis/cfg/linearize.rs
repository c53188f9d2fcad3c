//! Lowering a [`ControlFlowGraph`] back into a flat [`IrCode`] stream.
//!
//! Blocks are laid out in chains: starting from the entry, each block is followed by its
//! `Goto` successor while that successor is still unplaced. Remaining blocks start new
//! chains in id order. Labels, explicit `goto` instructions and try regions are then
//! emitted only where the layout needs them.

use std::collections::{HashMap, HashSet};

use crate::{
    analysis::cfg::{BlockEntry, BlockId, CfgEdgeKind, ControlFlowGraph, EdgeType},
    ir::{CatchHandler, IrCode, LabelId, TryId, TypeRef},
};

/// The handlers covering a block, in priority order, as `(catch type, handler block)`.
type HandlerKey = Vec<(Option<TypeRef>, BlockId)>;

impl ControlFlowGraph {
    /// Emits the graph as a flat instruction stream.
    ///
    /// Building the result again yields a graph with the same blocks, instructions and
    /// edges. Only block ids, label numbering and explicit jumps may differ.
    ///
    /// # Panics
    ///
    /// Panics if a block ends in an `if-*` or `switch` but has lost its `Branch` edges.
    #[must_use]
    pub fn linearize(&self) -> IrCode {
        let order = self.layout();
        let next: HashMap<BlockId, BlockId> = order.windows(2).map(|w| (w[0], w[1])).collect();

        let mut code = IrCode::new();
        let mut labels: HashMap<BlockId, LabelId> = HashMap::new();
        let mut open: Option<(TryId, HandlerKey)> = None;

        for &block in &order {
            let key = self.handler_key(block);
            if open.as_ref().is_some_and(|(_, k)| *k != key) {
                if let Some((id, _)) = open.take() {
                    code.push_try_end(id);
                }
            }

            if self.needs_label(block, &next) {
                let label = label_for(&mut code, &mut labels, block);
                code.bind(label);
            }

            if open.is_none() && !key.is_empty() {
                let handlers = key
                    .iter()
                    .map(|(catch_type, target)| CatchHandler {
                        catch_type: catch_type.clone(),
                        handler: label_for(&mut code, &mut labels, *target),
                    })
                    .collect();
                open = Some((code.push_try(handlers), key));
            }

            self.emit_entries(block, &mut code, &mut labels);

            if let Some(target) = self.goto_target(block) {
                if next.get(&block) != Some(&target) {
                    let label = label_for(&mut code, &mut labels, target);
                    code.push_goto(label);
                }
            }
        }
        if let Some((id, _)) = open {
            code.push_try_end(id);
        }

        let declared = code.registers_size().max(self.registers_size());
        code.set_registers_size(declared);
        code
    }

    fn layout(&self) -> Vec<BlockId> {
        let mut placed = HashSet::new();
        let mut order = Vec::with_capacity(self.num_blocks());
        let entry = self.entry_block();

        let starts = std::iter::once(entry).chain(self.block_ids());
        for start in starts {
            if placed.contains(&start) || (start != entry && self.continues_result(start)) {
                continue;
            }
            self.place_chain(start, &mut placed, &mut order);
        }
        // result-move heads whose primary never reached them
        for block in self.block_ids() {
            if !placed.contains(&block) {
                self.place_chain(block, &mut placed, &mut order);
            }
        }
        order
    }

    fn place_chain(&self, start: BlockId, placed: &mut HashSet<BlockId>, order: &mut Vec<BlockId>) {
        let mut block = start;
        loop {
            placed.insert(block);
            order.push(block);
            match self.goto_target(block) {
                Some(target) if !placed.contains(&target) => block = target,
                _ => break,
            }
        }
    }

    /// Whether `block` opens with a result move that must stay right behind the block that
    /// falls into it.
    fn continues_result(&self, block: BlockId) -> bool {
        let starts_with_result = self
            .block(block)
            .and_then(|b| b.first_insn())
            .is_some_and(|(_, insn)| insn.opcode().is_move_result_any());
        starts_with_result && self.preds(block).any(|e| e.edge_type() == EdgeType::Goto)
    }

    fn needs_label(&self, block: BlockId, next: &HashMap<BlockId, BlockId>) -> bool {
        self.preds(block).any(|edge| match edge.kind() {
            CfgEdgeKind::Goto => next.get(&edge.src()) != Some(&block),
            CfgEdgeKind::Branch { .. } | CfgEdgeKind::Throw { .. } => true,
        })
    }

    fn handler_key(&self, block: BlockId) -> HandlerKey {
        self.throws_in_order(block)
            .into_iter()
            .filter_map(|id| self.edge(id))
            .map(|edge| match edge.kind() {
                CfgEdgeKind::Throw { catch_type, .. } => (catch_type.clone(), edge.target()),
                _ => (None, edge.target()),
            })
            .collect()
    }

    fn emit_entries(
        &self,
        block: BlockId,
        code: &mut IrCode,
        labels: &mut HashMap<BlockId, LabelId>,
    ) {
        let Some(b) = self.block(block) else {
            return;
        };
        for entry in b.entries() {
            match entry {
                BlockEntry::Insn { insn, .. } if insn.opcode().is_conditional_branch() => {
                    let edge = self
                        .get_succ_edge_of_type(block, EdgeType::Branch)
                        .and_then(|id| self.edge(id))
                        .unwrap_or_else(|| {
                            panic!("{block} ends in {} without a branch edge", insn.opcode())
                        });
                    let label = label_for(code, labels, edge.target());
                    code.push_branch(insn.clone(), label);
                }
                BlockEntry::Insn { insn, .. } if insn.opcode().is_switch() => {
                    let cases: Vec<(i32, LabelId)> = self
                        .get_succ_edges_of_type(block, EdgeType::Branch)
                        .into_iter()
                        .filter_map(|id| self.edge(id))
                        .map(|edge| match edge.kind() {
                            CfgEdgeKind::Branch { case_key } => {
                                (case_key.unwrap_or_default(), edge.target())
                            }
                            _ => (0, edge.target()),
                        })
                        .map(|(key, target)| (key, label_for(code, labels, target)))
                        .collect();
                    code.push_switch(insn.clone(), cases);
                }
                BlockEntry::Insn { insn, .. } => code.push(insn.clone()),
                BlockEntry::Position(pos) => code.push_position(pos.clone()),
                BlockEntry::Debug(info) => code.push_debug(info.clone()),
            }
        }
    }
}

fn label_for(code: &mut IrCode, labels: &mut HashMap<BlockId, LabelId>, block: BlockId) -> LabelId {
    *labels.entry(block).or_insert_with(|| code.new_label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{dasm::*, IrOpcode, RefPool};

    fn diamond() -> IrCode {
        let mut code = IrCode::new();
        let other = code.new_label();
        let join = code.new_label();
        code.push(dasm_lit(IrOpcode::Const, &[0], 0));
        code.push_branch(dasm(IrOpcode::IfEqz, &[0]), other);
        code.push(dasm_lit(IrOpcode::Const, &[1], 1));
        code.push_goto(join);
        code.bind(other);
        code.push(dasm_lit(IrOpcode::Const, &[1], 2));
        code.bind(join);
        code.push(dasm(IrOpcode::Return, &[1]));
        code
    }

    #[test]
    fn straight_line_is_unchanged() {
        let mut code = IrCode::new();
        code.push(dasm_lit(IrOpcode::Const, &[0], 3));
        code.push(dasm_lit(IrOpcode::AddIntLit, &[1, 0], 4));
        code.push(dasm(IrOpcode::Return, &[1]));
        let cfg = ControlFlowGraph::build(&code).unwrap();
        assert_eq!(cfg.linearize().to_string(), code.to_string());
    }

    #[test]
    fn diamond_reaches_a_fixpoint() {
        let cfg = ControlFlowGraph::build(&diamond()).unwrap();
        let once = cfg.linearize();
        let twice = ControlFlowGraph::build(&once).unwrap().linearize();
        assert_eq!(once.to_string(), twice.to_string());
        assert_eq!(once.insn_count(), 6);
        assert_eq!(
            once.instructions().filter(|i| i.opcode().is_goto()).count(),
            1
        );
    }

    #[test]
    fn try_regions_are_rebuilt() {
        let pool = RefPool::new();
        let field = pool.field("LFoo;", "x", "I");
        let mut code = IrCode::new();
        let handler = code.new_label();
        let t = code.push_try(vec![CatchHandler::typed(pool.ty("LE;"), handler)]);
        code.push(dasm_field(IrOpcode::Iget, field, &[0]));
        code.push_try_end(t);
        code.push(dasm(IrOpcode::MoveResultPseudo, &[1]));
        code.push(dasm(IrOpcode::Return, &[1]));
        code.bind(handler);
        code.push(dasm(IrOpcode::MoveException, &[2]));
        code.push(dasm(IrOpcode::ReturnVoid, &[]));

        let cfg = ControlFlowGraph::build(&code).unwrap();
        assert_eq!(cfg.linearize().to_string(), code.to_string());
    }

    #[test]
    fn self_loop_keeps_its_jump() {
        let mut code = IrCode::new();
        let head = code.new_label();
        code.push(dasm_lit(IrOpcode::Const, &[0], 0));
        code.bind(head);
        code.push(dasm_lit(IrOpcode::AddIntLit, &[0, 0], 1));
        code.push_goto(head);

        let cfg = ControlFlowGraph::build(&code).unwrap();
        let out = cfg.linearize();
        assert_eq!(out.to_string(), code.to_string());
    }
}
