//! Construction of a [`ControlFlowGraph`] from a flat [`IrCode`] stream.
//!
//! The stream is scanned once. Labels, try markers and block-ending instructions
//! (branches, returns, throws) close the current block; the next instruction opens a new
//! one, falling through from the previous block when control can reach it that way.
//! Branch targets are resolved once all labels are known, then every block inside a try
//! region receives one throw edge per handler and is split so that each may-throw
//! instruction ends its block.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    analysis::cfg::{BlockEntry, BlockId, CfgEdgeKind, ControlFlowGraph},
    ir::{IrCode, IrEntry, IrInstruction, LabelId, TryId},
    Error, Result,
};

impl ControlFlowGraph {
    /// Builds the graph of a method body.
    ///
    /// Explicit `goto` instructions do not survive: they become `Goto` edges, and
    /// [`ControlFlowGraph::linearize`] re-creates them where the layout needs them.
    ///
    /// # Errors
    ///
    /// - [`Error::Empty`] if the stream has no instruction
    /// - [`Error::UnboundLabel`] if a branch or handler names a label that is never bound
    /// - [`Error::Malformed`] for a branch without target, a label bound twice, an
    ///   unbalanced or nested try marker, a result move without its primary, or code that
    ///   falls off the end
    pub fn build(code: &IrCode) -> Result<Self> {
        if code.insn_count() == 0 {
            return Err(Error::Empty);
        }

        let mut builder = Builder::new(code);
        for (index, entry) in code.entries().iter().enumerate() {
            builder.visit(index, entry)?;
        }
        builder.finish()
    }
}

struct Builder<'a> {
    code: &'a IrCode,
    cfg: ControlFlowGraph,
    entry_used: bool,
    current: Option<BlockId>,
    fallthrough_from: Option<BlockId>,
    pending_labels: Vec<LabelId>,
    pending_markers: Vec<BlockEntry>,
    bound: HashSet<LabelId>,
    label_blocks: HashMap<LabelId, BlockId>,
    branches: Vec<(BlockId, LabelId, CfgEdgeKind)>,
    active_try: Option<TryId>,
    block_try: BTreeMap<BlockId, TryId>,
}

impl<'a> Builder<'a> {
    fn new(code: &'a IrCode) -> Self {
        Builder {
            code,
            cfg: ControlFlowGraph::new(),
            entry_used: false,
            current: None,
            fallthrough_from: None,
            pending_labels: Vec::new(),
            pending_markers: Vec::new(),
            bound: HashSet::new(),
            label_blocks: HashMap::new(),
            branches: Vec::new(),
            active_try: None,
            block_try: BTreeMap::new(),
        }
    }

    fn visit(&mut self, index: usize, entry: &IrEntry) -> Result<()> {
        match entry {
            IrEntry::Insn(insn) => self.visit_insn(index, insn)?,
            IrEntry::Label(label) => {
                if !self.bound.insert(*label) {
                    return Err(malformed_error!("label {} is bound twice", label));
                }
                self.end_block();
                self.pending_labels.push(*label);
            }
            IrEntry::TryStart(id) => {
                if let Some(open) = self.active_try {
                    return Err(malformed_error!(
                        "try region {} starts inside try region {}",
                        id.index(),
                        open.index()
                    ));
                }
                self.end_block();
                self.active_try = Some(*id);
            }
            IrEntry::TryEnd(id) => {
                if self.active_try != Some(*id) {
                    return Err(malformed_error!(
                        "try region {} ends without being open",
                        id.index()
                    ));
                }
                self.end_block();
                self.active_try = None;
            }
            IrEntry::Position(pos) => self.marker(BlockEntry::Position(pos.clone())),
            IrEntry::Debug(info) => self.marker(BlockEntry::Debug(info.clone())),
        }
        Ok(())
    }

    fn visit_insn(&mut self, index: usize, insn: &IrInstruction) -> Result<()> {
        let block = self.ensure_block();
        let opcode = insn.opcode();
        let targets = self.code.targets(index);

        if opcode.is_branch() && targets.is_empty() {
            return Err(malformed_error!("{} at entry {} has no target", opcode, index));
        }

        if opcode.is_goto() {
            self.branches
                .push((block, targets[0].label, CfgEdgeKind::Goto));
            self.current = None;
            self.fallthrough_from = None;
            return Ok(());
        }

        self.cfg.append_insn(block, insn.clone());
        if opcode.is_conditional_branch() || opcode.is_switch() {
            for target in targets {
                self.branches.push((
                    block,
                    target.label,
                    CfgEdgeKind::Branch {
                        case_key: target.case_key,
                    },
                ));
            }
            self.end_block();
        } else if opcode.is_return() || opcode.is_throw() {
            self.current = None;
            self.fallthrough_from = None;
        }
        Ok(())
    }

    fn marker(&mut self, entry: BlockEntry) {
        match self.current {
            Some(block) => self.cfg.append_marker(block, entry),
            None => self.pending_markers.push(entry),
        }
    }

    fn end_block(&mut self) {
        if let Some(block) = self.current.take() {
            self.fallthrough_from = Some(block);
        }
    }

    fn ensure_block(&mut self) -> BlockId {
        if let Some(block) = self.current {
            return block;
        }
        let block = if self.entry_used {
            self.cfg.create_block()
        } else {
            self.entry_used = true;
            self.cfg.entry_block()
        };
        if let Some(from) = self.fallthrough_from.take() {
            self.cfg.add_edge(from, block, CfgEdgeKind::Goto);
        }
        for label in self.pending_labels.drain(..) {
            self.label_blocks.insert(label, block);
        }
        for marker in std::mem::take(&mut self.pending_markers) {
            self.cfg.append_marker(block, marker);
        }
        if let Some(id) = self.active_try {
            self.block_try.insert(block, id);
        }
        self.current = Some(block);
        block
    }

    fn resolve(&self, label: LabelId) -> Result<BlockId> {
        if let Some(block) = self.label_blocks.get(&label) {
            return Ok(*block);
        }
        if self.bound.contains(&label) {
            return Err(malformed_error!(
                "label {} is bound after the last instruction",
                label
            ));
        }
        Err(Error::UnboundLabel(label))
    }

    fn finish(mut self) -> Result<ControlFlowGraph> {
        if let Some(block) = self.current.or(self.fallthrough_from) {
            return Err(malformed_error!("control falls off the end of the code after {}", block));
        }
        if let Some(id) = self.active_try {
            return Err(malformed_error!("try region {} is never closed", id.index()));
        }

        let branches = std::mem::take(&mut self.branches);
        for (src, label, kind) in branches {
            let target = self.resolve(label)?;
            self.cfg.add_edge(src, target, kind);
        }

        let covered = std::mem::take(&mut self.block_try);
        for (&block, &id) in &covered {
            for (index, handler) in self.code.handlers(id).iter().enumerate() {
                let target = self.resolve(handler.handler)?;
                self.cfg.add_edge(
                    block,
                    target,
                    CfgEdgeKind::Throw {
                        index: index as u32,
                        catch_type: handler.catch_type.clone(),
                    },
                );
            }
        }
        for &block in covered.keys() {
            self.cfg.normalize_throwing_block(block);
        }

        let mut cfg = self.cfg;
        let orphan = cfg
            .instructions()
            .find(|(id, insn)| {
                insn.opcode().is_move_result_pseudo() && cfg.primary_of(*id).is_none()
            })
            .map(|(id, _)| id);
        if let Some(id) = orphan {
            return Err(malformed_error!("{} is a move-result-pseudo without primary", id));
        }

        cfg.recompute_registers_size();
        let declared = self.code.registers_size();
        if declared > cfg.registers_size() {
            cfg.set_registers_size(declared);
        }
        Ok(cfg)
    }
}
