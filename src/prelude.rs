//! # dexflow Prelude
//!
//! Re-exports the types needed by most users of the crate: the IR, the graph and its
//! mutation buffer, and the passes.
//!
//! ```rust
//! use dexflow::prelude::*;
//!
//! let config = OptimizerConfig::fast();
//! let scheduler = PassScheduler::from_config(&config, &RefPool::new(), Default::default())?;
//! assert_eq!(scheduler.passes().len(), 1);
//! # Ok::<(), dexflow::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

pub use crate::{Error, Result};

// ================================================================================================
// IR
// ================================================================================================

pub use crate::ir::{
    dasm::{dasm, dasm_field, dasm_lit, dasm_method, dasm_string, dasm_type},
    CatchHandler, IrCode, IrInstruction, IrOpcode, LabelId, MethodRef, RefPool, Reg,
    SourcePosition, TypeRef,
};

// ================================================================================================
// Control Flow Graph
// ================================================================================================

pub use crate::analysis::{
    BlockId, CfgEdgeKind, CfgMutation, ControlFlowGraph, EdgeType, Insert, InsnId,
};

// ================================================================================================
// Passes
// ================================================================================================

pub use crate::compiler::{
    AssumeNoSideEffects, CfgInliner, CfgPass, DceStats, EventKind, EventLog, InlinerPlugin,
    LocalDce, MethodBody, NoPureMethods, OptimizerConfig, PassScheduler, PurityOracle,
};
