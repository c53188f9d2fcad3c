//! The instruction model.
//!
//! # Key Components
//!
//! - [`IrOpcode`] / [`OpcodeFlags`] - the opcode set and its static property table
//! - [`IrInstruction`] / [`Operand`] - the instruction value type and its payload
//! - [`refs`] - interned string, type, field, method and data references, plus [`RefPool`]
//! - [`IrCode`] - the flat stream a graph is built from and linearized into
//! - [`dasm`] - terse constructors for hand-written bodies

mod code;
pub mod dasm;
mod instruction;
mod opcode;
pub mod refs;

pub use code::{
    BranchTarget, CatchHandler, DebugInfo, IrCode, IrEntry, LabelId, SourcePosition, TryId,
};
pub use instruction::{IrInstruction, Operand, Reg};
pub use opcode::{IrOpcode, OpcodeFlags, RefKind};
pub use refs::{DataRef, FieldRef, MethodRef, Proto, RefPool, StringRef, TypeRef};
