//! Control flow graph over one method body.
//!
//! A [`ControlFlowGraph`] is built from a flat [`crate::ir::IrCode`] stream, edited in
//! place by the optimization passes, and linearized back into a stream at the end.
//! Blocks and edges are arena-allocated and addressed by id, so callers can keep
//! [`BlockId`], [`EdgeId`] and [`InsnId`] values across edits.
//!
//! # Key Components
//!
//! - [`ControlFlowGraph`] - blocks, typed edges, instruction identity and editing
//! - [`CfgEdgeKind`] - `Goto`, `Branch` and `Throw` edges with their payloads
//! - [`CfgMutation`] - buffered insert-before, insert-after and replace edits
//!
//! # Shape
//!
//! The graph keeps a few properties true after every public edit:
//!
//! - a block has at most one `Goto` successor
//! - a may-throw instruction covered by handlers is the last instruction of its block
//! - a `move-result*` follows its primary, either in the same block or at the start of
//!   the primary's fallthrough block
//! - `goto` instructions never appear inside the graph; they are edges

mod block;
mod builder;
mod edge;
mod graph;
mod linearize;
mod mutation;

pub use block::{Block, BlockEntry, BlockId, InsnId, InsnPos};
pub use edge::{CfgEdge, CfgEdgeKind, EdgeId, EdgeType};
pub use graph::ControlFlowGraph;
pub use mutation::{CfgMutation, Insert};
