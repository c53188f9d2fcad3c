//! Terse instruction constructors.
//!
//! Each helper takes the registers in textual order: the destination first when the
//! opcode has one, then the sources. This keeps hand-written method bodies in tests and
//! benchmarks readable:
//!
//! ```rust
//! use dexflow::ir::{dasm::*, IrOpcode};
//!
//! let add = dasm(IrOpcode::AddInt, &[2, 0, 1]);
//! assert_eq!(add.dest(), Some(2));
//! assert_eq!(add.srcs(), &[0, 1]);
//!
//! let one = dasm_lit(IrOpcode::Const, &[0], 1);
//! assert_eq!(one.to_string(), "const v0 1");
//! ```

use crate::ir::{
    instruction::{IrInstruction, Reg},
    opcode::IrOpcode,
    refs::{FieldRef, MethodRef, StringRef, TypeRef},
};

/// An instruction without payload.
///
/// # Panics
///
/// Panics if the opcode has a destination and `regs` is empty.
#[must_use]
pub fn dasm(opcode: IrOpcode, regs: &[Reg]) -> IrInstruction {
    let insn = IrInstruction::new(opcode);
    if opcode.has_dest() {
        let (dest, srcs) = regs
            .split_first()
            .unwrap_or_else(|| panic!("{opcode} needs a destination register"));
        insn.with_dest(*dest).with_srcs(srcs.iter().copied())
    } else {
        insn.with_srcs(regs.iter().copied())
    }
}

/// An instruction with a literal payload.
#[must_use]
pub fn dasm_lit(opcode: IrOpcode, regs: &[Reg], literal: i64) -> IrInstruction {
    dasm(opcode, regs).with_literal(literal)
}

/// An instruction with a string payload.
#[must_use]
pub fn dasm_string(opcode: IrOpcode, value: StringRef, regs: &[Reg]) -> IrInstruction {
    dasm(opcode, regs).with_string(value)
}

/// An instruction with a type payload.
#[must_use]
pub fn dasm_type(opcode: IrOpcode, ty: TypeRef, regs: &[Reg]) -> IrInstruction {
    dasm(opcode, regs).with_type(ty)
}

/// An instruction with a field payload.
#[must_use]
pub fn dasm_field(opcode: IrOpcode, field: FieldRef, regs: &[Reg]) -> IrInstruction {
    dasm(opcode, regs).with_field(field)
}

/// An instruction with a method payload.
#[must_use]
pub fn dasm_method(opcode: IrOpcode, method: MethodRef, regs: &[Reg]) -> IrInstruction {
    dasm(opcode, regs).with_method(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dest_comes_first() {
        let mrp = dasm(IrOpcode::MoveResultPseudoObject, &[3]);
        assert_eq!(mrp.dest(), Some(3));
        assert!(mrp.srcs().is_empty());

        let put = dasm(IrOpcode::Aput, &[0, 1, 2]);
        assert_eq!(put.dest(), None);
        assert_eq!(put.srcs(), &[0, 1, 2]);
    }

    #[test]
    fn typed_payload() {
        let insn = dasm_type(IrOpcode::InstanceOf, TypeRef::new("LFoo;"), &[0]);
        assert_eq!(insn.to_string(), "instance-of v0 LFoo;");
    }
}
