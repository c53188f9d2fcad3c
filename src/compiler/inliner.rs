//! Splicing a callee graph into a caller at a call site.
//!
//! The callee is copied, its registers are moved above the caller's, parameters and
//! returns are lowered to register moves, and its blocks are wired in between the two
//! halves of the split call-site block. When the call site is covered by catch handlers,
//! every throwing callee block is connected to those handlers too.
//!
//! The [`InlinerPlugin`] hooks let a caller customize the procedure: provide argument or
//! result registers, keep the call site, or rewrite the callee before and after its
//! registers are renumbered.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tracing::debug;

use crate::{
    analysis::{Block, BlockEntry, BlockId, CfgEdgeKind, ControlFlowGraph, EdgeType, InsnId},
    compiler::{
        pass::{CfgPass, MethodBody},
        EventKind, EventLog,
    },
    ir::{IrInstruction, IrOpcode, MethodRef, Reg, SourcePosition, TypeRef},
    Error, Result,
};

/// Customization hooks for [`CfgInliner::inline_cfg_with`].
///
/// Every method has a default that matches plain call-site inlining.
pub trait InlinerPlugin {
    /// Called on the callee copy before its registers are renumbered.
    fn before_remap(&mut self, _caller: &ControlFlowGraph, _callee: &mut ControlFlowGraph) {}

    /// Called on the callee copy once parameters and returns have been lowered.
    fn after_remap(&mut self, _caller: &ControlFlowGraph, _callee: &mut ControlFlowGraph) {}

    /// Registers that feed the callee's parameters, in order. `None` uses the call site's
    /// sources.
    fn source_registers(&self) -> Option<Vec<Reg>> {
        None
    }

    /// Register receiving the callee's return value. `None` uses the destination of the
    /// call site's result move, if any.
    fn return_register(&self) -> Option<Reg> {
        None
    }

    /// Place the callee after the call site instead of before it.
    fn insert_after(&self) -> bool {
        false
    }

    /// Delete the call site (and its result move) once the callee is in place.
    fn remove_call_site(&self) -> bool {
        true
    }
}

/// The plugin used by [`CfgInliner::inline_cfg`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInlinerPlugin;

impl InlinerPlugin for DefaultInlinerPlugin {}

/// Graph-level inliner.
#[derive(Debug, Clone, Copy, Default)]
pub struct CfgInliner;

impl CfgInliner {
    /// Replaces the invoke `call_site` in `caller` with a copy of `callee`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnInvoke`] if `call_site` is not an invoke, and
    /// [`Error::Error`] if the invoke passes fewer registers than the callee loads.
    pub fn inline_cfg(
        caller: &mut ControlFlowGraph,
        call_site: InsnId,
        callee: &ControlFlowGraph,
    ) -> Result<()> {
        Self::inline_cfg_with(caller, call_site, callee, &mut DefaultInlinerPlugin)
    }

    /// Copies `callee` into `caller` at `call_site`, steered by `plugin`.
    ///
    /// The caller is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::GraphError`] if `call_site` is not in `caller`
    /// - [`Error::NotAnInvoke`] if the plugin supplies no source registers and
    ///   `call_site` is not an invoke
    /// - [`Error::Error`] if there are fewer source registers than `load-param`s
    pub fn inline_cfg_with(
        caller: &mut ControlFlowGraph,
        call_site: InsnId,
        callee: &ControlFlowGraph,
        plugin: &mut dyn InlinerPlugin,
    ) -> Result<()> {
        let site = caller
            .insn(call_site)
            .cloned()
            .ok_or_else(|| Error::GraphError(format!("{call_site} is not in the caller")))?;
        let srcs = match plugin.source_registers() {
            Some(srcs) => srcs,
            None if site.opcode().is_invoke() => site.srcs().to_vec(),
            None => return Err(Error::NotAnInvoke(site.to_string())),
        };

        let mut callee = callee.clone();
        plugin.before_remap(caller, &mut callee);

        let params: Vec<InsnId> = callee
            .instructions()
            .filter(|(_, insn)| insn.opcode().is_load_param())
            .map(|(id, _)| id)
            .collect();
        if srcs.len() < params.len() {
            return Err(Error::Error(format!(
                "{} passes {} registers to a callee with {} parameters",
                site,
                srcs.len(),
                params.len()
            )));
        }

        // the cached size may lag behind edits that used higher registers
        let reserved = caller.registers_size();
        caller.recompute_registers_size();
        let shift = caller.registers_size().max(reserved);
        caller.set_registers_size(shift);
        callee.remap_registers(|reg| reg + shift);

        let site_block = caller
            .block_of(call_site)
            .ok_or_else(|| Error::GraphError(format!("{call_site} has no block")))?;
        let caller_catches = handlers_of(caller, site_block);
        let site_position = position_before(caller, call_site).map(Arc::new);

        let move_result = caller.move_result_of(call_site);
        let return_reg = plugin
            .return_register()
            .or_else(|| move_result.and_then(|id| caller.insn(id)).and_then(IrInstruction::dest));

        let (pre, post) = if plugin.insert_after() {
            split_after(caller, move_result.unwrap_or(call_site))?
        } else {
            split_before(caller, call_site)?
        };
        if plugin.remove_call_site() {
            caller.remove_insn(call_site);
        }
        keep_handlers_on_thrower(caller, pre, post);

        if !caller_catches.is_empty() {
            callee.split_after_throwers();
        }
        lower_params(&mut callee, &params, &srcs);
        let exits = lower_returns(&mut callee, return_reg);

        plugin.after_remap(caller, &mut callee);

        if let Some(parent) = &site_position {
            for pos in callee.positions_mut() {
                if pos.parent.is_none() {
                    pos.parent = Some(Arc::clone(parent));
                }
            }
        }

        let callee_entry = callee.entry_block();
        let callee_size = callee.num_instructions();
        let mapping = caller.absorb(callee);
        let entry = mapping[&callee_entry];

        match caller.get_succ_edge_of_type(pre, EdgeType::Goto) {
            Some(edge) => caller.set_edge_target(edge, entry),
            None => {
                caller.add_edge(pre, entry, CfgEdgeKind::Goto);
            }
        }
        for exit in exits {
            caller.add_edge(mapping[&exit], post, CfgEdgeKind::Goto);
        }

        if !caller_catches.is_empty() {
            let mut blocks: Vec<BlockId> = mapping.values().copied().collect();
            blocks.sort_unstable();
            for block in blocks {
                add_caller_catches(caller, block, &caller_catches);
            }
        }

        caller.recompute_registers_size();
        debug!(
            target: "dexflow::inliner",
            site = %call_site,
            blocks = mapping.len(),
            instructions = callee_size,
            "inlined {site}"
        );
        Ok(())
    }
}

/// The `Throw` successors of `block` as `(catch type, handler)` in priority order.
fn handlers_of(cfg: &ControlFlowGraph, block: BlockId) -> Vec<(Option<TypeRef>, BlockId)> {
    cfg.throws_in_order(block)
        .into_iter()
        .filter_map(|id| cfg.edge(id))
        .filter_map(|edge| match edge.kind() {
            CfgEdgeKind::Throw { catch_type, .. } => Some((catch_type.clone(), edge.target())),
            _ => None,
        })
        .collect()
}

/// The closest source position before `site`, looking back through single-predecessor
/// blocks.
fn position_before(cfg: &ControlFlowGraph, site: InsnId) -> Option<SourcePosition> {
    let pos = cfg.find_insn(site)?;
    let mut block = pos.block;
    let mut end = pos.index;
    let mut seen = HashSet::new();
    loop {
        let b = cfg.block(block)?;
        let found = b.entries()[..end].iter().rev().find_map(|entry| match entry {
            BlockEntry::Position(p) => Some(p.clone()),
            _ => None,
        });
        if found.is_some() {
            return found;
        }
        if !seen.insert(block) {
            return None;
        }
        let preds = cfg.predecessors(block);
        let [pred] = preds.as_slice() else {
            return None;
        };
        block = *pred;
        end = cfg.block(block)?.entries().len();
    }
}

/// Splits so that `anchor` ends its block.
fn split_after(cfg: &mut ControlFlowGraph, anchor: InsnId) -> Result<(BlockId, BlockId)> {
    let pos = cfg
        .find_insn(anchor)
        .ok_or_else(|| Error::GraphError(format!("{anchor} is not in the caller")))?;
    let post = cfg.split_block(pos);
    Ok((pos.block, post))
}

/// Splits so that `anchor` begins its block.
fn split_before(cfg: &mut ControlFlowGraph, anchor: InsnId) -> Result<(BlockId, BlockId)> {
    let pos = cfg
        .find_insn(anchor)
        .ok_or_else(|| Error::GraphError(format!("{anchor} is not in the caller")))?;
    let post = cfg.split_block_before(pos);
    Ok((pos.block, post))
}

/// Leaves the handler edges of a split block on whichever half can still throw.
fn keep_handlers_on_thrower(cfg: &mut ControlFlowGraph, pre: BlockId, post: BlockId) {
    let moved = handlers_of(cfg, post);
    if moved.is_empty() {
        return;
    }
    if throws(cfg, pre) && cfg.get_succ_edges_of_type(pre, EdgeType::Throw).is_empty() {
        for (index, (catch_type, target)) in moved.into_iter().enumerate() {
            cfg.add_edge(
                pre,
                target,
                CfgEdgeKind::Throw {
                    index: index as u32,
                    catch_type,
                },
            );
        }
    }
    if !throws(cfg, post) {
        for edge in cfg.get_succ_edges_of_type(post, EdgeType::Throw) {
            cfg.remove_edge(edge);
        }
    }
}

fn throws(cfg: &ControlFlowGraph, block: BlockId) -> bool {
    cfg.block(block).is_some_and(Block::has_throwing_insn)
}

fn lower_params(callee: &mut ControlFlowGraph, params: &[InsnId], srcs: &[Reg]) {
    for (&id, &src) in params.iter().zip(srcs) {
        if let Some(insn) = callee.insn_mut(id) {
            if let Some(op) = insn.opcode().lowered_move() {
                insn.set_opcode(op);
                insn.set_srcs(vec![src]);
            }
        }
    }
}

/// Turns each return into a move into `return_reg` (or drops it) and reports the blocks
/// that used to return.
fn lower_returns(callee: &mut ControlFlowGraph, return_reg: Option<Reg>) -> Vec<BlockId> {
    let returns: Vec<(InsnId, BlockId)> = callee
        .instructions()
        .filter(|(_, insn)| insn.opcode().is_return())
        .filter_map(|(id, _)| callee.block_of(id).map(|b| (id, b)))
        .collect();

    let mut exits = Vec::with_capacity(returns.len());
    for (id, block) in returns {
        let lowered = callee.insn(id).and_then(|insn| insn.opcode().lowered_move());
        match (return_reg, lowered) {
            (Some(reg), Some(op)) => {
                if let Some(insn) = callee.insn_mut(id) {
                    insn.set_opcode(op);
                    insn.set_dest(reg);
                }
            }
            _ => {
                callee.remove_insn(id);
            }
        }
        exits.push(block);
    }
    exits
}

fn add_caller_catches(
    cfg: &mut ControlFlowGraph,
    block: BlockId,
    catches: &[(Option<TypeRef>, BlockId)],
) {
    if !throws(cfg, block) {
        return;
    }
    let first = cfg
        .throws_in_order(block)
        .into_iter()
        .filter_map(|id| cfg.edge(id).and_then(|e| e.throw_index()))
        .max()
        .map_or(0, |max| max + 1);
    for (offset, (catch_type, target)) in catches.iter().enumerate() {
        cfg.add_edge(
            block,
            *target,
            CfgEdgeKind::Throw {
                index: first + offset as u32,
                catch_type: catch_type.clone(),
            },
        );
    }
}

/// Inlines calls to small static and direct methods whose graphs are known.
pub struct InliningPass {
    callees: Arc<HashMap<MethodRef, ControlFlowGraph>>,
    max_callee_instructions: usize,
}

impl InliningPass {
    /// Creates the pass over a table of callee graphs.
    #[must_use]
    pub fn new(
        callees: Arc<HashMap<MethodRef, ControlFlowGraph>>,
        max_callee_instructions: usize,
    ) -> Self {
        Self {
            callees,
            max_callee_instructions,
        }
    }
}

impl CfgPass for InliningPass {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn description(&self) -> &'static str {
        "Inlines small static and direct callees"
    }

    fn run_on_method(&self, body: &mut MethodBody, events: &EventLog) -> Result<bool> {
        let sites: Vec<(InsnId, MethodRef)> = body
            .cfg
            .instructions()
            .filter(|(_, insn)| {
                matches!(
                    insn.opcode(),
                    IrOpcode::InvokeStatic | IrOpcode::InvokeDirect
                )
            })
            .map(|(id, insn)| (id, insn.get_method().clone()))
            .filter(|(_, method)| *method != body.method)
            .collect();

        let mut changed = false;
        for (site, method) in sites {
            let Some(callee) = self.callees.get(&method) else {
                continue;
            };
            if callee.num_instructions() > self.max_callee_instructions {
                continue;
            }
            CfgInliner::inline_cfg(&mut body.cfg, site, callee)?;
            events
                .record(EventKind::CallSiteInlined)
                .method(&body.method)
                .message(method.to_string());
            changed = true;
        }
        Ok(changed)
    }
}
