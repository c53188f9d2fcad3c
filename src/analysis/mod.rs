//! Program analysis infrastructure.
//!
//! This module holds the control flow graph the optimization passes work on:
//! building it from a flat stream, editing it in place, and lowering it back.
//!
//! # Architecture
//!
//! - [`cfg`] - Control Flow Graph construction, mutation and linearization
//!
//! # Usage
//!
//! ```rust
//! use dexflow::{
//!     analysis::{ControlFlowGraph, EdgeType},
//!     ir::{dasm::*, IrCode, IrOpcode},
//! };
//!
//! let mut code = IrCode::new();
//! let skip = code.new_label();
//! code.push(dasm(IrOpcode::LoadParam, &[0]));
//! code.push_branch(dasm(IrOpcode::IfEqz, &[0]), skip);
//! code.push(dasm_lit(IrOpcode::Const, &[0], 1));
//! code.bind(skip);
//! code.push(dasm(IrOpcode::Return, &[0]));
//!
//! let cfg = ControlFlowGraph::build(&code)?;
//! let entry = cfg.entry_block();
//! assert!(cfg.get_succ_edge_of_type(entry, EdgeType::Branch).is_some());
//! assert_eq!(cfg.blocks_post().last(), Some(&entry));
//! # Ok::<(), dexflow::Error>(())
//! ```

pub mod cfg;

pub use cfg::{
    Block, BlockEntry, BlockId, CfgEdge, CfgEdgeKind, CfgMutation, ControlFlowGraph, EdgeId,
    EdgeType, Insert, InsnId, InsnPos,
};
