//! Control Flow Graph implementation.
//!
//! The graph is an arena: blocks live in a `BTreeMap` keyed by [`BlockId`] and edges in a
//! vector of optional slots addressed by [`EdgeId`]. Block ids, edge ids and instruction
//! ids are all handed out monotonically and never reused, which is what lets the mutation
//! buffer and the inliner hold on to ids across edits.
//!
//! Every structural edit goes through a small set of routines that keep three things in
//! step: the per-block predecessor and successor lists, the instruction location index,
//! and the throwing-block shape (a may-throw instruction covered by handlers is always
//! the last instruction of its block).

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt,
};

use crate::{
    analysis::cfg::{
        Block, BlockEntry, BlockId, CfgEdge, CfgEdgeKind, EdgeId, EdgeType, InsnId, InsnPos,
    },
    ir::{IrInstruction, IrOpcode, Reg, SourcePosition},
    utils::DotWriter,
};

/// A control flow graph over one method body.
///
/// # Examples
///
/// ```rust
/// use dexflow::{
///     ir::{dasm::*, IrCode, IrOpcode},
///     ControlFlowGraph,
/// };
///
/// let mut code = IrCode::new();
/// code.push(dasm_lit(IrOpcode::Const, &[0], 7));
/// code.push(dasm(IrOpcode::Return, &[0]));
///
/// let cfg = ControlFlowGraph::build(&code)?;
/// assert_eq!(cfg.num_blocks(), 1);
/// assert_eq!(cfg.registers_size(), 1);
/// # Ok::<(), dexflow::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    blocks: BTreeMap<BlockId, Block>,
    edges: Vec<Option<CfgEdge>>,
    entry: BlockId,
    next_block: u32,
    next_insn: u32,
    registers_size: u32,
    locations: HashMap<InsnId, BlockId>,
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowGraph {
    /// A graph holding a single empty entry block.
    #[must_use]
    pub fn new() -> Self {
        let entry = BlockId(0);
        let mut blocks = BTreeMap::new();
        blocks.insert(entry, Block::new(entry));
        ControlFlowGraph {
            blocks,
            edges: Vec::new(),
            entry,
            next_block: 1,
            next_insn: 0,
            registers_size: 0,
            locations: HashMap::new(),
        }
    }

    // --------------------------------------------------------------------------------------
    // Blocks
    // --------------------------------------------------------------------------------------

    /// The entry block.
    #[must_use]
    pub const fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// Makes `block` the entry.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not in the graph.
    pub fn set_entry_block(&mut self, block: BlockId) {
        assert!(self.blocks.contains_key(&block), "no block {block}");
        self.entry = block;
    }

    /// Blocks that leave the method: those ending in a return or a throw, and those without
    /// successors.
    #[must_use]
    pub fn exit_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .values()
            .filter(|block| {
                block.succs.is_empty()
                    || block.last_insn().is_some_and(|(_, insn)| {
                        insn.opcode().is_return() || insn.opcode().is_throw()
                    })
            })
            .map(Block::id)
            .collect()
    }

    /// The block with id `id`.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// All blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// All block ids in ascending order.
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    /// Number of blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Adds an empty, unconnected block.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.blocks.insert(id, Block::new(id));
        id
    }

    /// Deletes `block` with all its edges.
    ///
    /// # Returns
    ///
    /// The number of instructions that went away with the block.
    ///
    /// # Panics
    ///
    /// Panics if `block` is the entry or not in the graph.
    pub fn remove_block(&mut self, block: BlockId) -> usize {
        assert_ne!(block, self.entry, "the entry block cannot be removed");
        let attached: Vec<EdgeId> = {
            let b = self.block_ref(block);
            b.preds.iter().chain(&b.succs).copied().collect()
        };
        for edge in attached {
            if self.edge(edge).is_some() {
                self.remove_edge(edge);
            }
        }
        let removed = self
            .blocks
            .remove(&block)
            .unwrap_or_else(|| panic!("no block {block}"));
        let mut count = 0;
        for entry in &removed.entries {
            if let Some(id) = entry.insn_id() {
                self.locations.remove(&id);
                count += 1;
            }
        }
        count
    }

    /// Splits `pos.block` after entry `pos.index`.
    ///
    /// The entries after the split point and all outgoing edges move to a new block, which
    /// becomes the `Goto` successor of the original one.
    ///
    /// # Returns
    ///
    /// The id of the new block.
    pub fn split_block(&mut self, pos: InsnPos) -> BlockId {
        self.split_at(pos.block, pos.index + 1)
    }

    /// Splits `pos.block` so that entry `pos.index` starts a new block. The original block
    /// keeps everything before it (possibly nothing) and falls through to the new block.
    ///
    /// # Returns
    ///
    /// The id of the new block.
    pub fn split_block_before(&mut self, pos: InsnPos) -> BlockId {
        self.split_at(pos.block, pos.index)
    }

    fn split_at(&mut self, block: BlockId, at: usize) -> BlockId {
        let tail_block = self.create_block();
        let (tail, succs) = {
            let b = self.block_mut(block);
            assert!(at <= b.entries.len(), "split point {at} past the end of {block}");
            (b.entries.split_off(at), std::mem::take(&mut b.succs))
        };
        for entry in &tail {
            if let Some(id) = entry.insn_id() {
                self.locations.insert(id, tail_block);
            }
        }
        for &edge in &succs {
            self.edge_mut(edge).set_src(tail_block);
        }
        {
            let t = self.block_mut(tail_block);
            t.entries = tail;
            t.succs = succs;
        }
        self.add_edge(block, tail_block, CfgEdgeKind::Goto);
        tail_block
    }

    // --------------------------------------------------------------------------------------
    // Edges
    // --------------------------------------------------------------------------------------

    /// The edge with id `id`, or `None` if it was removed.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&CfgEdge> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    /// Number of live edges.
    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.edges.iter().flatten().count()
    }

    /// Outgoing edges of `block`, in insertion order.
    pub fn succs(&self, block: BlockId) -> impl Iterator<Item = &CfgEdge> + '_ {
        self.block_ref(block)
            .succs
            .iter()
            .map(move |&e| self.edge_ref(e))
    }

    /// Incoming edges of `block`.
    pub fn preds(&self, block: BlockId) -> impl Iterator<Item = &CfgEdge> + '_ {
        self.block_ref(block)
            .preds
            .iter()
            .map(move |&e| self.edge_ref(e))
    }

    /// Successor blocks of `block`, one entry per edge.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.succs(block).map(CfgEdge::target).collect()
    }

    /// Predecessor blocks of `block`, one entry per edge.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.preds(block).map(CfgEdge::src).collect()
    }

    /// Connects `src` to `target`.
    ///
    /// # Panics
    ///
    /// Panics if either block is not in the graph.
    pub fn add_edge(&mut self, src: BlockId, target: BlockId, kind: CfgEdgeKind) -> EdgeId {
        assert!(self.blocks.contains_key(&target), "no block {target}");
        let id = EdgeId(self.edges.len() as u32);
        self.block_mut(src).succs.push(id);
        self.block_mut(target).preds.push(id);
        self.edges.push(Some(CfgEdge::new(src, target, kind)));
        id
    }

    /// Disconnects an edge.
    ///
    /// # Panics
    ///
    /// Panics if the edge was already removed.
    pub fn remove_edge(&mut self, id: EdgeId) {
        let edge = self
            .edges
            .get_mut(id.index())
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("edge {id} is not in the graph"));
        if let Some(src) = self.blocks.get_mut(&edge.src()) {
            src.succs.retain(|&e| e != id);
        }
        if let Some(target) = self.blocks.get_mut(&edge.target()) {
            target.preds.retain(|&e| e != id);
        }
    }

    /// Points an edge at a different block.
    ///
    /// # Panics
    ///
    /// Panics if the edge was removed or `target` is not in the graph.
    pub fn set_edge_target(&mut self, id: EdgeId, target: BlockId) {
        assert!(self.blocks.contains_key(&target), "no block {target}");
        let old = self.edge_ref(id).target();
        self.edge_mut(id).set_target(target);
        self.block_mut(old).preds.retain(|&e| e != id);
        self.block_mut(target).preds.push(id);
    }

    /// The unique outgoing edge of type `ty`.
    ///
    /// # Panics
    ///
    /// Panics if `block` has more than one such edge.
    #[must_use]
    pub fn get_succ_edge_of_type(&self, block: BlockId, ty: EdgeType) -> Option<EdgeId> {
        let edges = self.get_succ_edges_of_type(block, ty);
        assert!(
            edges.len() <= 1,
            "{block} has {} {ty:?} edges where one was expected",
            edges.len()
        );
        edges.first().copied()
    }

    /// All outgoing edges of type `ty`, in insertion order.
    #[must_use]
    pub fn get_succ_edges_of_type(&self, block: BlockId, ty: EdgeType) -> Vec<EdgeId> {
        self.block_ref(block)
            .succs
            .iter()
            .copied()
            .filter(|&e| self.edge_ref(e).edge_type() == ty)
            .collect()
    }

    /// Outgoing throw edges sorted by handler priority.
    #[must_use]
    pub fn throws_in_order(&self, block: BlockId) -> Vec<EdgeId> {
        let mut throws = self.get_succ_edges_of_type(block, EdgeType::Throw);
        throws.sort_by_key(|&e| self.edge_ref(e).throw_index());
        throws
    }

    /// The target of the `Goto` edge of `block`.
    #[must_use]
    pub fn goto_target(&self, block: BlockId) -> Option<BlockId> {
        self.get_succ_edge_of_type(block, EdgeType::Goto)
            .map(|e| self.edge_ref(e).target())
    }

    // --------------------------------------------------------------------------------------
    // Instructions
    // --------------------------------------------------------------------------------------

    /// Every instruction with its id, blocks visited in id order.
    pub fn instructions(&self) -> impl Iterator<Item = (InsnId, &IrInstruction)> + '_ {
        self.blocks.values().flat_map(|b| b.instructions())
    }

    /// Number of instructions in the graph.
    #[must_use]
    pub fn num_instructions(&self) -> usize {
        self.locations.len()
    }

    /// The id of the `n`-th instruction of [`ControlFlowGraph::instructions`].
    #[must_use]
    pub fn nth_insn(&self, n: usize) -> Option<InsnId> {
        self.instructions().nth(n).map(|(id, _)| id)
    }

    /// Current location of instruction `id`, or `None` if it is no longer in the graph.
    #[must_use]
    pub fn find_insn(&self, id: InsnId) -> Option<InsnPos> {
        let block = *self.locations.get(&id)?;
        let index = self.blocks.get(&block)?.position_of(id)?;
        Some(InsnPos { block, index })
    }

    /// The block holding instruction `id`.
    #[must_use]
    pub fn block_of(&self, id: InsnId) -> Option<BlockId> {
        self.locations.get(&id).copied()
    }

    /// The instruction with id `id`.
    #[must_use]
    pub fn insn(&self, id: InsnId) -> Option<&IrInstruction> {
        let pos = self.find_insn(id)?;
        self.blocks[&pos.block].entries[pos.index].insn()
    }

    /// Mutable access to an instruction. Changing an instruction into or out of a branch
    /// is not tracked; use the edge API for control flow.
    pub fn insn_mut(&mut self, id: InsnId) -> Option<&mut IrInstruction> {
        let pos = self.find_insn(id)?;
        match self.blocks.get_mut(&pos.block)?.entries.get_mut(pos.index)? {
            BlockEntry::Insn { insn, .. } => Some(insn),
            _ => None,
        }
    }

    /// The `move-result*` or `move-result-pseudo*` that picks up the result of `id`.
    ///
    /// This is the next instruction in the same block or, when `id` ends its block, the
    /// first instruction of the `Goto` successor.
    #[must_use]
    pub fn move_result_of(&self, id: InsnId) -> Option<InsnId> {
        let pos = self.find_insn(id)?;
        let block = &self.blocks[&pos.block];
        let primary = block.entries[pos.index].insn()?.opcode();
        if !primary.has_move_result_any() {
            return None;
        }
        let next = block.entries[pos.index + 1..]
            .iter()
            .find_map(|e| e.insn_id().zip(e.insn()));
        let (next_id, next) = match next {
            Some(found) => found,
            None => self.block_ref(self.goto_target(pos.block)?).first_insn()?,
        };
        reads_result_of(primary, next.opcode()).then_some(next_id)
    }

    /// The `move-result-pseudo*` paired with `id`, if it has one.
    #[must_use]
    pub fn move_result_pseudo_of(&self, id: InsnId) -> Option<InsnId> {
        self.move_result_of(id)
            .filter(|&r| self.insn(r).is_some_and(|i| i.opcode().is_move_result_pseudo()))
    }

    /// The instruction whose result the `move-result*` `id` picks up.
    #[must_use]
    pub fn primary_of(&self, id: InsnId) -> Option<InsnId> {
        let pos = self.find_insn(id)?;
        let block = &self.blocks[&pos.block];
        let result = block.entries[pos.index].insn()?.opcode();
        if !result.is_move_result_any() {
            return None;
        }
        let previous = block.entries[..pos.index]
            .iter()
            .rev()
            .find_map(|e| e.insn_id().zip(e.insn()));
        match previous {
            Some((prev_id, prev)) => reads_result_of(prev.opcode(), result).then_some(prev_id),
            None => self
                .preds(pos.block)
                .filter(|e| e.edge_type() == EdgeType::Goto)
                .filter_map(|e| self.block_ref(e.src()).last_insn())
                .find(|(_, prev)| reads_result_of(prev.opcode(), result))
                .map(|(prev_id, _)| prev_id),
        }
    }

    /// Inserts `insns` immediately before `anchor`.
    ///
    /// # Returns
    ///
    /// The ids of the inserted instructions.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not in the graph, if it is a result move (which must stay
    /// glued to its primary), or if `insns` contains a branch.
    pub fn insert_before(&mut self, anchor: InsnId, insns: Vec<IrInstruction>) -> Vec<InsnId> {
        let pos = self.expect_insn(anchor);
        let anchor_op = self.blocks[&pos.block].entries[pos.index]
            .insn()
            .map(IrInstruction::opcode);
        assert!(
            !anchor_op.is_some_and(IrOpcode::is_move_result_any),
            "cannot insert between {anchor} and the instruction whose result it reads"
        );
        self.insert_at(pos, insns)
    }

    /// Inserts `insns` immediately after `anchor`, or after its result move if it has one.
    ///
    /// When the anchor is a may-throw instruction that must end its block, the
    /// instructions start its fallthrough successor instead. A successor shared with other
    /// predecessors is first separated by a fresh block on the fallthrough edge. When
    /// `insns` can throw, that block also takes the anchor's handlers unless the successor
    /// already has exactly the same ones.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not in the graph or `insns` contains a branch.
    pub fn insert_after(&mut self, anchor: InsnId, insns: Vec<IrInstruction>) -> Vec<InsnId> {
        let last = self.move_result_of(anchor).unwrap_or(anchor);
        let pos = self.expect_insn(last);
        let block = &self.blocks[&pos.block];
        let ends_block = block.last_insn().map(|(id, _)| id) == Some(last);
        let pinned = ends_block
            && block.entries[pos.index].insn().is_some_and(IrInstruction::may_throw)
            && !self.get_succ_edges_of_type(pos.block, EdgeType::Throw).is_empty();

        if pinned {
            let throws = insns.iter().any(IrInstruction::may_throw);
            let succ = self.private_fallthrough(pos.block, throws);
            self.insert_at(
                InsnPos {
                    block: succ,
                    index: 0,
                },
                insns,
            )
        } else {
            self.insert_at(
                InsnPos {
                    block: pos.block,
                    index: pos.index + 1,
                },
                insns,
            )
        }
    }

    /// Replaces `anchor` (and its result move) with `insns`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`ControlFlowGraph::insert_before`].
    pub fn replace_insn(&mut self, anchor: InsnId, insns: Vec<IrInstruction>) -> Vec<InsnId> {
        let ids = self.insert_before(anchor, insns);
        // An inserted return or throw may already have cut the anchor off.
        if self.find_insn(anchor).is_some() {
            self.remove_insn(anchor);
        }
        ids
    }

    /// Removes one instruction together with the other half of its result pair.
    ///
    /// Removing a primary also removes its `move-result*`; removing a
    /// `move-result-pseudo*` also removes its primary. Removing an `if-*` or `switch`
    /// drops the block's `Branch` edges so only the `Goto` survives, and a block left
    /// without any may-throw instruction loses its `Throw` edges.
    ///
    /// # Returns
    ///
    /// The number of instructions removed (one or two).
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in the graph.
    pub fn remove_insn(&mut self, id: InsnId) -> usize {
        let pos = self.expect_insn(id);
        let opcode = self.blocks[&pos.block].entries[pos.index]
            .insn()
            .map(IrInstruction::opcode);

        let mut doomed = vec![id];
        if opcode.is_some_and(IrOpcode::is_move_result_pseudo) {
            doomed.extend(self.primary_of(id));
        } else {
            doomed.extend(self.move_result_of(id));
        }

        let mut touched = Vec::new();
        for victim in &doomed {
            let (block, insn) = self.detach(*victim);
            if insn.opcode().is_branch() {
                for edge in self.get_succ_edges_of_type(block, EdgeType::Branch) {
                    self.remove_edge(edge);
                }
            }
            touched.push(block);
        }
        for block in touched {
            self.drop_stale_throw_edges(block);
        }
        doomed.len()
    }

    fn insert_at(&mut self, pos: InsnPos, insns: Vec<IrInstruction>) -> Vec<InsnId> {
        let mut ids = Vec::with_capacity(insns.len());
        let mut terminal = None;
        for (offset, insn) in insns.into_iter().enumerate() {
            assert!(
                !insn.opcode().is_branch(),
                "{} cannot be inserted as a plain instruction; connect blocks with the edge API",
                insn.opcode()
            );
            let id = self.alloc_insn_id();
            if terminal.is_none() && insn.opcode().is_terminal() {
                terminal = Some(pos.index + offset);
            }
            self.locations.insert(id, pos.block);
            self.block_mut(pos.block)
                .entries
                .insert(pos.index + offset, BlockEntry::Insn { id, insn });
            ids.push(id);
        }
        if let Some(index) = terminal {
            self.truncate_after(pos.block, index);
        }
        self.normalize_throwing_block(pos.block);
        ids
    }

    /// Drops everything after the return or throw at entry `index` along with the
    /// control flow that no longer leaves the block.
    fn truncate_after(&mut self, block: BlockId, index: usize) {
        let (tail, is_throw) = {
            let b = self.block_mut(block);
            let is_throw = b.entries[index]
                .insn()
                .is_some_and(|i| i.opcode().is_throw());
            (b.entries.split_off(index + 1), is_throw)
        };
        for entry in &tail {
            if let Some(id) = entry.insn_id() {
                self.locations.remove(&id);
            }
        }
        let succs = self.block_ref(block).succs.clone();
        for edge in succs {
            if !(is_throw && self.edge_ref(edge).edge_type() == EdgeType::Throw) {
                self.remove_edge(edge);
            }
        }
    }

    /// Re-establishes the throwing-block shape of `block`: while a may-throw instruction
    /// that is not last is covered by throw edges, split after it and give the front piece
    /// copies of the handlers. Finally drop the handlers of a piece that cannot throw.
    pub(crate) fn normalize_throwing_block(&mut self, block: BlockId) {
        let mut current = block;
        loop {
            let throws = self.throws_in_order(current);
            if throws.is_empty() {
                return;
            }
            let split = {
                let b = self.block_ref(current);
                let last = b.entries.iter().rposition(|e| e.insn().is_some());
                b.entries
                    .iter()
                    .enumerate()
                    .find(|(i, e)| Some(*i) != last && e.insn().is_some_and(IrInstruction::may_throw))
                    .map(|(i, _)| i)
            };
            let Some(index) = split else {
                self.drop_stale_throw_edges(current);
                return;
            };
            let tail = self.split_block(InsnPos {
                block: current,
                index,
            });
            for edge in throws {
                let (target, kind) = {
                    let e = self.edge_ref(edge);
                    (e.target(), e.kind().clone())
                };
                self.add_edge(current, target, kind);
            }
            current = tail;
        }
    }

    /// Splits every block so that each may-throw instruction ends its block, whether or
    /// not the block is covered by handlers yet.
    pub(crate) fn split_after_throwers(&mut self) {
        for block in self.block_ids() {
            let mut current = block;
            loop {
                let split = {
                    let b = self.block_ref(current);
                    let last = b.entries.iter().rposition(|e| e.insn().is_some());
                    b.entries
                        .iter()
                        .enumerate()
                        .find(|(i, e)| {
                            Some(*i) != last && e.insn().is_some_and(IrInstruction::may_throw)
                        })
                        .map(|(i, _)| i)
                };
                let Some(index) = split else { break };
                current = self.split_block(InsnPos {
                    block: current,
                    index,
                });
            }
        }
    }

    fn drop_stale_throw_edges(&mut self, block: BlockId) {
        if self.blocks.get(&block).is_none_or(Block::has_throwing_insn) {
            return;
        }
        for edge in self.get_succ_edges_of_type(block, EdgeType::Throw) {
            self.remove_edge(edge);
        }
    }

    /// A fallthrough successor of `block` that has no other predecessor, creating one on
    /// the `Goto` edge if needed.
    ///
    /// With `covered` set the returned block also carries the same handlers as `block`, so
    /// a thrower placed at its start stays in the try region of the instruction before it.
    fn private_fallthrough(&mut self, block: BlockId, covered: bool) -> BlockId {
        let edge = self
            .get_succ_edge_of_type(block, EdgeType::Goto)
            .unwrap_or_else(|| panic!("{block} ends in a throwing instruction without fallthrough"));
        let succ = self.edge_ref(edge).target();
        let handlers = self.handler_list(block);
        if self.block_ref(succ).preds.len() == 1
            && (!covered || self.handler_list(succ) == handlers)
        {
            return succ;
        }
        let middle = self.create_block();
        self.set_edge_target(edge, middle);
        self.add_edge(middle, succ, CfgEdgeKind::Goto);
        if covered {
            for (target, kind) in handlers {
                self.add_edge(middle, target, kind);
            }
        }
        middle
    }

    /// Targets and kinds of the `Throw` edges of `block`, in priority order.
    fn handler_list(&self, block: BlockId) -> Vec<(BlockId, CfgEdgeKind)> {
        self.throws_in_order(block)
            .into_iter()
            .map(|e| {
                let edge = self.edge_ref(e);
                (edge.target(), edge.kind().clone())
            })
            .collect()
    }

    pub(crate) fn append_insn(&mut self, block: BlockId, insn: IrInstruction) -> InsnId {
        let id = self.alloc_insn_id();
        self.locations.insert(id, block);
        self.block_mut(block)
            .entries
            .push(BlockEntry::Insn { id, insn });
        id
    }

    pub(crate) fn append_marker(&mut self, block: BlockId, entry: BlockEntry) {
        debug_assert!(entry.insn_id().is_none());
        self.block_mut(block).entries.push(entry);
    }

    fn alloc_insn_id(&mut self) -> InsnId {
        let id = InsnId(self.next_insn);
        self.next_insn += 1;
        id
    }

    fn detach(&mut self, id: InsnId) -> (BlockId, IrInstruction) {
        let pos = self.expect_insn(id);
        self.locations.remove(&id);
        match self.block_mut(pos.block).entries.remove(pos.index) {
            BlockEntry::Insn { insn, .. } => (pos.block, insn),
            _ => unreachable!("location index points at a marker"),
        }
    }

    fn expect_insn(&self, id: InsnId) -> InsnPos {
        self.find_insn(id)
            .unwrap_or_else(|| panic!("{id} is not in the graph"))
    }

    // --------------------------------------------------------------------------------------
    // Whole-graph operations
    // --------------------------------------------------------------------------------------

    /// Blocks reachable from the entry over any edge type.
    #[must_use]
    pub fn reachable_blocks(&self) -> HashSet<BlockId> {
        let mut seen = HashSet::from([self.entry]);
        let mut queue = VecDeque::from([self.entry]);
        while let Some(block) = queue.pop_front() {
            for edge in self.succs(block) {
                if seen.insert(edge.target()) {
                    queue.push_back(edge.target());
                }
            }
        }
        seen
    }

    /// Deletes every block the entry cannot reach.
    ///
    /// # Returns
    ///
    /// The number of instructions removed.
    pub fn remove_unreachable_blocks(&mut self) -> usize {
        let reachable = self.reachable_blocks();
        let dead: Vec<BlockId> = self
            .blocks
            .keys()
            .copied()
            .filter(|b| !reachable.contains(b))
            .collect();
        dead.into_iter().map(|b| self.remove_block(b)).sum()
    }

    /// Blocks reachable from the entry in depth-first postorder, successors visited in
    /// edge order.
    #[must_use]
    pub fn blocks_post(&self) -> Vec<BlockId> {
        let mut visited = HashSet::from([self.entry]);
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![(self.entry, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (block, next) = *top;
            let succs = &self.blocks[&block].succs;
            if next < succs.len() {
                top.1 += 1;
                let target = self.edge_ref(succs[next]).target();
                if visited.insert(target) {
                    stack.push((target, 0));
                }
            } else {
                order.push(block);
                stack.pop();
            }
        }
        order
    }

    /// Reverse of [`ControlFlowGraph::blocks_post`].
    #[must_use]
    pub fn blocks_reverse_post(&self) -> Vec<BlockId> {
        let mut order = self.blocks_post();
        order.reverse();
        order
    }

    /// Cached number of registers.
    #[must_use]
    pub const fn registers_size(&self) -> u32 {
        self.registers_size
    }

    /// Overrides the cached number of registers.
    pub fn set_registers_size(&mut self, size: u32) {
        self.registers_size = size;
    }

    /// Rescans every instruction and caches one past the highest register in use.
    pub fn recompute_registers_size(&mut self) {
        self.registers_size = self
            .instructions()
            .map(|(_, insn)| insn.register_end())
            .max()
            .unwrap_or(0);
    }

    /// Reserves a fresh register.
    pub fn allocate_temp(&mut self) -> Reg {
        let reg = self.registers_size;
        self.registers_size += 1;
        reg
    }

    /// Reserves a fresh register pair.
    pub fn allocate_wide_temp(&mut self) -> Reg {
        let reg = self.registers_size;
        self.registers_size += 2;
        reg
    }

    /// Rewrites every register of every instruction and debug marker through `f`, then
    /// recomputes the register count.
    pub fn remap_registers(&mut self, f: impl Fn(Reg) -> Reg) {
        for block in self.blocks.values_mut() {
            for entry in &mut block.entries {
                match entry {
                    BlockEntry::Insn { insn, .. } => insn.remap_registers(&f),
                    BlockEntry::Debug(info) => info.remap_registers(&f),
                    BlockEntry::Position(_) => {}
                }
            }
        }
        self.recompute_registers_size();
    }

    pub(crate) fn positions_mut(&mut self) -> impl Iterator<Item = &mut SourcePosition> + '_ {
        self.blocks
            .values_mut()
            .flat_map(|block| block.entries.iter_mut())
            .filter_map(|entry| match entry {
                BlockEntry::Position(pos) => Some(pos),
                _ => None,
            })
    }

    /// Moves all blocks and edges of `other` into this graph under fresh block and
    /// instruction ids. The result maps the old block ids to the new ones.
    pub(crate) fn absorb(&mut self, other: ControlFlowGraph) -> HashMap<BlockId, BlockId> {
        let ControlFlowGraph {
            blocks, mut edges, ..
        } = other;
        let mapping: HashMap<BlockId, BlockId> = blocks
            .keys()
            .map(|&old| (old, self.create_block()))
            .collect();
        let ordered: Vec<EdgeId> = blocks.values().flat_map(|b| b.succs.clone()).collect();

        for (old, block) in blocks {
            let new = mapping[&old];
            for entry in block.entries {
                match entry {
                    BlockEntry::Insn { insn, .. } => {
                        self.append_insn(new, insn);
                    }
                    marker => self.append_marker(new, marker),
                }
            }
        }
        for id in ordered {
            if let Some(edge) = edges.get_mut(id.index()).and_then(Option::take) {
                self.add_edge(
                    mapping[&edge.src()],
                    mapping[&edge.target()],
                    edge.kind().clone(),
                );
            }
        }
        mapping
    }

    /// Renders the graph in DOT format.
    #[must_use]
    pub fn to_dot(&self, name: &str) -> String {
        let mut dot = DotWriter::new(name);
        for block in self.blocks.values() {
            let lines: Vec<String> = block.entries.iter().map(entry_line).collect();
            let title = if block.id() == self.entry {
                format!("{} (entry)", block.id())
            } else {
                block.id().to_string()
            };
            dot.node(&block.id().to_string(), &title, &lines);
        }
        for edge in self.edges.iter().flatten() {
            let style = edge.kind().is_exceptional().then_some("dashed");
            dot.edge(
                &edge.src().to_string(),
                &edge.target().to_string(),
                &edge.kind().to_string(),
                style,
            );
        }
        dot.finish()
    }

    fn block_ref(&self, id: BlockId) -> &Block {
        self.blocks
            .get(&id)
            .unwrap_or_else(|| panic!("no block {id}"))
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks
            .get_mut(&id)
            .unwrap_or_else(|| panic!("no block {id}"))
    }

    fn edge_ref(&self, id: EdgeId) -> &CfgEdge {
        self.edge(id)
            .unwrap_or_else(|| panic!("edge {id} is not in the graph"))
    }

    fn edge_mut(&mut self, id: EdgeId) -> &mut CfgEdge {
        self.edges
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("edge {id} is not in the graph"))
    }
}

/// Whether `result` is the kind of result move that follows `primary`.
fn reads_result_of(primary: IrOpcode, result: IrOpcode) -> bool {
    if primary.has_move_result_pseudo() {
        result.is_move_result_pseudo()
    } else if primary.has_move_result() {
        result.is_move_result_any() && !result.is_move_result_pseudo()
    } else {
        false
    }
}

fn entry_line(entry: &BlockEntry) -> String {
    match entry {
        BlockEntry::Insn { insn, .. } => insn.to_string(),
        BlockEntry::Position(pos) => format!(".pos {pos}"),
        BlockEntry::Debug(info) => format!(".dbg {info}"),
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.blocks.values() {
            write!(f, "{}", block.id())?;
            if block.id() == self.entry {
                f.write_str(" (entry)")?;
            }
            let preds = self.predecessors(block.id());
            if !preds.is_empty() {
                f.write_str(" <-")?;
                for pred in preds {
                    write!(f, " {pred}")?;
                }
            }
            writeln!(f)?;
            for entry in &block.entries {
                writeln!(f, "  {}", entry_line(entry))?;
            }
            for edge in self.succs(block.id()) {
                writeln!(f, "  -> {} ({})", edge.target(), edge.kind())?;
            }
        }
        Ok(())
    }
}
