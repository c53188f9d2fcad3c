//! Batched instruction edits over a [`ControlFlowGraph`].
//!
//! A pass that walks the graph cannot insert into it while it iterates. Instead it queues
//! its edits in a [`CfgMutation`], addressed by [`InsnId`], and applies the whole batch in
//! one [`CfgMutation::flush`] once it is done iterating. Because anchors are stable ids,
//! applying one change never invalidates another.
//!
//! # Examples
//!
//! ```rust
//! use dexflow::{
//!     analysis::{CfgMutation, Insert},
//!     ir::{dasm::*, IrCode, IrOpcode},
//!     ControlFlowGraph,
//! };
//!
//! let mut code = IrCode::new();
//! code.push(dasm_lit(IrOpcode::Const, &[0], 1));
//! code.push(dasm(IrOpcode::Return, &[0]));
//! let mut cfg = ControlFlowGraph::build(&code)?;
//!
//! let ret = cfg.nth_insn(1).unwrap();
//! {
//!     let mut mutation = CfgMutation::new(&mut cfg);
//!     mutation.add_change(Insert::Before, ret, vec![dasm_lit(IrOpcode::Const, &[1], 2)]);
//! } // flushed on drop
//!
//! assert_eq!(cfg.num_instructions(), 3);
//! # Ok::<(), dexflow::Error>(())
//! ```

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    analysis::cfg::{ControlFlowGraph, InsnId},
    ir::IrInstruction,
};

/// Where a queued change goes relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Insert {
    /// Immediately before the anchor.
    Before,
    /// Immediately after the anchor, or after its result move if it has one.
    After,
    /// In place of the anchor and its result move.
    Replacing,
}

#[derive(Debug, Default)]
struct ChangeSet {
    before: Vec<IrInstruction>,
    replacing: Option<Vec<IrInstruction>>,
    after: Vec<IrInstruction>,
}

/// A pending batch of edits, applied on [`CfgMutation::flush`] or when dropped.
///
/// The buffer holds the graph's only mutable borrow for its whole lifetime.
pub struct CfgMutation<'a> {
    cfg: &'a mut ControlFlowGraph,
    changes: BTreeMap<InsnId, ChangeSet>,
}

impl<'a> CfgMutation<'a> {
    /// An empty batch over `cfg`.
    pub fn new(cfg: &'a mut ControlFlowGraph) -> Self {
        CfgMutation {
            cfg,
            changes: BTreeMap::new(),
        }
    }

    /// Read access to the graph while changes are pending. The graph does not reflect
    /// them until the next flush.
    #[must_use]
    pub fn cfg(&self) -> &ControlFlowGraph {
        self.cfg
    }

    /// Queues `insns` relative to `anchor`.
    ///
    /// Several `Before` or `After` changes on one anchor are applied in call order.
    ///
    /// # Panics
    ///
    /// Panics if `anchor` is not in the graph, or if `kind` is [`Insert::Replacing`] and
    /// the anchor already has a pending replacement.
    pub fn add_change(&mut self, kind: Insert, anchor: InsnId, insns: Vec<IrInstruction>) {
        assert!(
            self.cfg.find_insn(anchor).is_some(),
            "cannot anchor a change on {anchor}: it is not in the graph"
        );
        let set = self.changes.entry(anchor).or_default();
        match kind {
            Insert::Before => set.before.extend(insns),
            Insert::After => set.after.extend(insns),
            Insert::Replacing => {
                assert!(
                    set.replacing.is_none(),
                    "{anchor} already has a pending replacement"
                );
                set.replacing = Some(insns);
            }
        }
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Applies every queued change and clears the batch.
    ///
    /// At each anchor the `Before` instructions come first, then the replacement (which
    /// removes the anchor and its result move), then the `After` instructions. Changes
    /// whose anchor has disappeared since they were queued are dropped.
    ///
    /// # Returns
    ///
    /// `true` if at least one change was applied.
    pub fn flush(&mut self) -> bool {
        let changes = std::mem::take(&mut self.changes);
        let mut applied = false;

        for (anchor, set) in changes {
            let ChangeSet {
                before,
                replacing,
                after,
            } = set;
            if !before.is_empty() {
                applied |= self.apply(anchor, "before", |cfg| {
                    cfg.insert_before(anchor, before);
                });
            }
            if !after.is_empty() {
                applied |= self.apply(anchor, "after", |cfg| {
                    cfg.insert_after(anchor, after);
                });
            }
            if let Some(insns) = replacing {
                applied |= self.apply(anchor, "replacing", |cfg| {
                    cfg.replace_insn(anchor, insns);
                });
            }
        }
        applied
    }

    fn apply(
        &mut self,
        anchor: InsnId,
        what: &str,
        edit: impl FnOnce(&mut ControlFlowGraph),
    ) -> bool {
        if self.cfg.find_insn(anchor).is_none() {
            debug!(target: "dexflow::cfg", %anchor, what, "dropping change on a removed anchor");
            return false;
        }
        edit(self.cfg);
        true
    }
}

impl Drop for CfgMutation<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{dasm::*, IrCode, IrOpcode};

    fn simple() -> ControlFlowGraph {
        let mut code = IrCode::new();
        code.push(dasm_lit(IrOpcode::Const, &[0], 0));
        code.push(dasm_lit(IrOpcode::Const, &[1], 1));
        code.push(dasm(IrOpcode::ReturnVoid, &[]));
        ControlFlowGraph::build(&code).unwrap()
    }

    fn literals(cfg: &ControlFlowGraph) -> Vec<i64> {
        cfg.instructions()
            .filter(|(_, i)| i.opcode() == IrOpcode::Const)
            .map(|(_, i)| i.get_literal())
            .collect()
    }

    #[test]
    fn empty_flush_is_a_noop() {
        let mut cfg = simple();
        let before = cfg.to_string();
        let mut m = CfgMutation::new(&mut cfg);
        assert!(m.is_empty());
        assert!(!m.flush());
        assert!(!m.flush());
        drop(m);
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn before_replacing_after_order() {
        let mut cfg = simple();
        let anchor = cfg.nth_insn(1).unwrap();
        {
            let mut m = CfgMutation::new(&mut cfg);
            m.add_change(Insert::After, anchor, vec![dasm_lit(IrOpcode::Const, &[1], 5)]);
            m.add_change(Insert::Replacing, anchor, vec![dasm_lit(IrOpcode::Const, &[1], 4)]);
            m.add_change(Insert::Before, anchor, vec![dasm_lit(IrOpcode::Const, &[1], 3)]);
            m.add_change(Insert::After, anchor, vec![dasm_lit(IrOpcode::Const, &[1], 6)]);
            assert!(!m.is_empty());
            assert!(m.flush());
            assert!(m.is_empty());
        }
        assert_eq!(literals(&cfg), vec![0, 3, 4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "already has a pending replacement")]
    fn second_replacement_panics() {
        let mut cfg = simple();
        let anchor = cfg.nth_insn(0).unwrap();
        let mut m = CfgMutation::new(&mut cfg);
        m.add_change(Insert::Replacing, anchor, vec![]);
        m.add_change(Insert::Replacing, anchor, vec![]);
    }

    #[test]
    fn stale_anchor_is_dropped() {
        let mut cfg = simple();
        let first = cfg.nth_insn(0).unwrap();
        let second = cfg.nth_insn(1).unwrap();
        {
            let mut m = CfgMutation::new(&mut cfg);
            // a return inserted before the first constant cuts off everything after it
            m.add_change(Insert::Before, first, vec![dasm(IrOpcode::ReturnVoid, &[])]);
            m.add_change(Insert::After, second, vec![dasm_lit(IrOpcode::Const, &[2], 9)]);
        }
        assert_eq!(cfg.num_instructions(), 1);
        assert!(cfg.find_insn(second).is_none());
    }
}
