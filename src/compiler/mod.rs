//! Transformations over control flow graphs.
//!
//! This module sits on top of [`crate::analysis`]:
//!
//! - [`LocalDce`] removes instructions whose results are never used.
//! - [`CfgInliner`] splices a callee graph into a caller at a call site.
//! - [`PassScheduler`] runs [`CfgPass`] implementations over many methods to a fixpoint,
//!   configured by an [`OptimizerConfig`].
//! - [`EventLog`] records every change the passes make.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  OptimizerConfig ──► PassScheduler                        │
//! │                        ├─ InliningPass  (CfgInliner)      │
//! │                        └─ LocalDcePass  (LocalDce)        │
//! │                              │                            │
//! │                              ▼                            │
//! │  MethodBody { MethodRef, ControlFlowGraph }  × N (rayon)  │
//! │                              │                            │
//! │                              ▼                            │
//! │  EventLog ──► DerivedStats                                │
//! └───────────────────────────────────────────────────────────┘
//! ```

mod config;
mod events;
mod inliner;
mod pass;
mod passes;
mod purity;
mod scheduler;

pub use config::OptimizerConfig;
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use inliner::{CfgInliner, DefaultInlinerPlugin, InlinerPlugin, InliningPass};
pub use pass::{CfgPass, MethodBody};
pub use passes::{DceStats, LocalDce, LocalDcePass};
pub use purity::{AssumeNoSideEffects, NoPureMethods, PurityOracle};
pub use scheduler::PassScheduler;
