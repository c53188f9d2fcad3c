// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # dexflow
//!
//! A control-flow-graph based IR mutation and dataflow engine for register-based bytecode
//! optimizers.
//!
//! `dexflow` turns a linear instruction stream ([`ir::IrCode`]) into a
//! [`ControlFlowGraph`] of basic blocks, lets passes edit that graph safely, and
//! linearizes it back. Around the graph it provides:
//!
//! - **Batched mutation** - [`analysis::CfgMutation`] queues insertions and replacements
//!   keyed by stable instruction ids and applies them in one flush
//! - **Dead code elimination** - [`compiler::LocalDce`] removes instructions whose values
//!   are never observed, honouring `move-result-pseudo` pairing and wide registers
//! - **Inlining** - [`compiler::CfgInliner`] splices a callee graph into a caller, wiring
//!   the callee's throwing blocks to the caller's catch handlers
//! - **Scheduling** - [`compiler::PassScheduler`] runs passes over many methods in
//!   parallel until nothing changes
//!
//! ## Quick Start
//!
//! ```rust
//! use dexflow::prelude::*;
//!
//! let mut code = IrCode::new();
//! code.push(dasm_lit(IrOpcode::Const, &[0], 1));
//! code.push(dasm_lit(IrOpcode::Const, &[1], 2));
//! code.push(dasm(IrOpcode::Return, &[1]));
//!
//! let mut cfg = ControlFlowGraph::build(&code)?;
//! let pure = std::collections::HashSet::new();
//! let stats = LocalDce::new(&NoPureMethods, &pure).dce(&mut cfg);
//! assert_eq!(stats.dead_instruction_count, 1);
//!
//! let optimized = cfg.linearize();
//! assert_eq!(optimized.insn_count(), 2);
//! # Ok::<(), dexflow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Opcodes, instructions, interned references and the linear instruction stream
//! - [`analysis`] - The control flow graph: building, editing and linearizing
//! - [`compiler`] - Passes, the inliner, the scheduler and its configuration
//! - [`utils`] - Bit sets and DOT rendering
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! All diagnostics go through [`tracing`] under the `dexflow::cfg`, `dexflow::dce`,
//! `dexflow::inliner` and `dexflow::scheduler` targets. Install any subscriber to see
//! them.

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod compiler;
pub mod ir;
pub mod prelude;
pub mod utils;

pub use analysis::ControlFlowGraph;
pub use error::Error;

/// `dexflow` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
