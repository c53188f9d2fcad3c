//! Basic blocks and the ids that address their contents.

use std::fmt;

use crate::{
    analysis::cfg::EdgeId,
    ir::{DebugInfo, IrInstruction, SourcePosition},
};

/// Identity of a block inside one graph. Ids are assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// The raw id.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// Stable identity of an instruction inside one graph.
///
/// Assigned when the instruction enters the graph and never reused, so an `InsnId` taken
/// before a batch of edits still names the same instruction afterwards (or nothing, if it
/// was removed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(pub(crate) u32);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// A transient location: a block and an entry index inside it. Invalidated by any edit
/// to that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InsnPos {
    /// The containing block.
    pub block: BlockId,
    /// Index into [`Block::entries`].
    pub index: usize,
}

/// One entry of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEntry {
    /// An instruction and its identity.
    Insn {
        /// The instruction's identity.
        id: InsnId,
        /// The instruction.
        insn: IrInstruction,
    },
    /// A source line marker.
    Position(SourcePosition),
    /// A debug marker.
    Debug(DebugInfo),
}

impl BlockEntry {
    /// The instruction id, if this entry is an instruction.
    #[must_use]
    pub fn insn_id(&self) -> Option<InsnId> {
        match self {
            BlockEntry::Insn { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// The instruction, if this entry is one.
    #[must_use]
    pub fn insn(&self) -> Option<&IrInstruction> {
        match self {
            BlockEntry::Insn { insn, .. } => Some(insn),
            _ => None,
        }
    }
}

/// A basic block.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    pub(crate) entries: Vec<BlockEntry>,
    pub(crate) preds: Vec<EdgeId>,
    pub(crate) succs: Vec<EdgeId>,
}

impl Block {
    pub(crate) fn new(id: BlockId) -> Self {
        Block {
            id,
            entries: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    /// This block's id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Instructions and markers in order.
    #[must_use]
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Incoming edges.
    #[must_use]
    pub fn preds(&self) -> &[EdgeId] {
        &self.preds
    }

    /// Outgoing edges, in insertion order.
    #[must_use]
    pub fn succs(&self) -> &[EdgeId] {
        &self.succs
    }

    /// Instructions with their ids, markers skipped.
    pub fn instructions(&self) -> impl DoubleEndedIterator<Item = (InsnId, &IrInstruction)> {
        self.entries.iter().filter_map(|entry| match entry {
            BlockEntry::Insn { id, insn } => Some((*id, insn)),
            _ => None,
        })
    }

    /// Number of instructions.
    #[must_use]
    pub fn num_instructions(&self) -> usize {
        self.instructions().count()
    }

    /// Returns `true` if the block holds no instruction (markers may remain).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions().next().is_none()
    }

    /// The first instruction.
    #[must_use]
    pub fn first_insn(&self) -> Option<(InsnId, &IrInstruction)> {
        self.instructions().next()
    }

    /// The last instruction.
    #[must_use]
    pub fn last_insn(&self) -> Option<(InsnId, &IrInstruction)> {
        self.instructions().next_back()
    }

    /// Entry index of instruction `id`.
    #[must_use]
    pub fn position_of(&self, id: InsnId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.insn_id() == Some(id))
    }

    /// Returns `true` if some instruction in the block may throw.
    #[must_use]
    pub fn has_throwing_insn(&self) -> bool {
        self.instructions().any(|(_, insn)| insn.may_throw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{dasm::dasm_lit, IrOpcode, StringRef};

    #[test]
    fn instruction_queries_skip_markers() {
        let mut block = Block::new(BlockId(4));
        block
            .entries
            .push(BlockEntry::Position(SourcePosition::new(StringRef::new("A.java"), 1)));
        block.entries.push(BlockEntry::Insn {
            id: InsnId(7),
            insn: dasm_lit(IrOpcode::Const, &[0], 1),
        });
        block.entries.push(BlockEntry::Debug(DebugInfo::PrologueEnd));

        assert_eq!(block.num_instructions(), 1);
        assert_eq!(block.first_insn().map(|(id, _)| id), Some(InsnId(7)));
        assert_eq!(block.last_insn().map(|(id, _)| id), Some(InsnId(7)));
        assert_eq!(block.position_of(InsnId(7)), Some(1));
        assert!(!block.is_empty());
        assert!(!block.has_throwing_insn());
        assert_eq!(block.id().to_string(), "B4");
    }
}
