//! The IR instruction value type.
//!
//! An [`IrInstruction`] is an opcode, an optional destination register, an ordered list of
//! source registers and one [`Operand`]. The opcode decides which operand variant is valid:
//! accessors such as [`IrInstruction::get_type`] panic when asked for the wrong one, since a
//! mismatch can only come from a bug in the caller.

use std::fmt;

use crate::ir::{
    opcode::{IrOpcode, RefKind},
    refs::{DataRef, FieldRef, MethodRef, StringRef, TypeRef},
};

/// A virtual register number. Wide values occupy `r` and `r + 1`.
pub type Reg = u32;

/// Instruction payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Operand {
    /// No payload.
    #[default]
    None,
    /// Integer literal.
    Literal(i64),
    /// String constant.
    String(StringRef),
    /// Type reference.
    Type(TypeRef),
    /// Field reference.
    Field(FieldRef),
    /// Method reference.
    Method(MethodRef),
    /// Array payload.
    Data(DataRef),
}

impl Operand {
    fn kind(&self) -> RefKind {
        match self {
            Operand::None => RefKind::None,
            Operand::Literal(_) => RefKind::Literal,
            Operand::String(_) => RefKind::String,
            Operand::Type(_) => RefKind::Type,
            Operand::Field(_) => RefKind::Field,
            Operand::Method(_) => RefKind::Method,
            Operand::Data(_) => RefKind::Data,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::String(s) => write!(f, "{s}"),
            Operand::Type(t) => write!(f, "{t}"),
            Operand::Field(fr) => write!(f, "{fr}"),
            Operand::Method(m) => write!(f, "{m}"),
            Operand::Data(d) => write!(f, "{d}"),
        }
    }
}

/// A single IR instruction.
///
/// Built with [`IrInstruction::new`] and the `with_*` builders:
///
/// ```rust
/// use dexflow::ir::{IrInstruction, IrOpcode};
///
/// let insn = IrInstruction::new(IrOpcode::AddIntLit)
///     .with_dest(1)
///     .with_srcs([0])
///     .with_literal(4);
/// assert_eq!(insn.to_string(), "add-int-lit v1 v0 4");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IrInstruction {
    opcode: IrOpcode,
    dest: Option<Reg>,
    srcs: Vec<Reg>,
    operand: Operand,
}

impl IrInstruction {
    /// An instruction with no registers. Literal opcodes start out with a zero literal.
    #[must_use]
    pub fn new(opcode: IrOpcode) -> Self {
        let operand = if opcode.ref_kind() == RefKind::Literal {
            Operand::Literal(0)
        } else {
            Operand::None
        };
        IrInstruction {
            opcode,
            dest: None,
            srcs: Vec::new(),
            operand,
        }
    }

    /// Builder form of [`IrInstruction::set_dest`].
    #[must_use]
    pub fn with_dest(mut self, dest: Reg) -> Self {
        self.set_dest(dest);
        self
    }

    /// Builder form of [`IrInstruction::set_srcs`].
    #[must_use]
    pub fn with_srcs(mut self, srcs: impl IntoIterator<Item = Reg>) -> Self {
        self.srcs = srcs.into_iter().collect();
        self
    }

    /// Builder form of [`IrInstruction::set_literal`].
    #[must_use]
    pub fn with_literal(mut self, value: i64) -> Self {
        self.set_literal(value);
        self
    }

    /// Sets a string payload.
    #[must_use]
    pub fn with_string(self, value: StringRef) -> Self {
        self.with_operand(Operand::String(value))
    }

    /// Sets a type payload.
    #[must_use]
    pub fn with_type(self, value: TypeRef) -> Self {
        self.with_operand(Operand::Type(value))
    }

    /// Sets a field payload.
    #[must_use]
    pub fn with_field(self, value: FieldRef) -> Self {
        self.with_operand(Operand::Field(value))
    }

    /// Sets a method payload.
    #[must_use]
    pub fn with_method(self, value: MethodRef) -> Self {
        self.with_operand(Operand::Method(value))
    }

    /// Sets an array payload.
    #[must_use]
    pub fn with_data(self, value: DataRef) -> Self {
        self.with_operand(Operand::Data(value))
    }

    /// Sets the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload variant does not match the opcode.
    #[must_use]
    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.set_operand(operand);
        self
    }

    /// The opcode.
    #[must_use]
    pub fn opcode(&self) -> IrOpcode {
        self.opcode
    }

    /// Changes the opcode. Registers and payload are kept; a destination is dropped if the
    /// new opcode has none.
    pub fn set_opcode(&mut self, opcode: IrOpcode) {
        self.opcode = opcode;
        if !opcode.has_dest() {
            self.dest = None;
        }
    }

    /// Writes a destination register.
    #[must_use]
    pub fn has_dest(&self) -> bool {
        self.opcode.has_dest()
    }

    /// The destination register, if the opcode has one and it was set.
    #[must_use]
    pub fn dest(&self) -> Option<Reg> {
        self.dest
    }

    /// Sets the destination register.
    ///
    /// # Panics
    ///
    /// Panics if the opcode has no destination.
    pub fn set_dest(&mut self, dest: Reg) {
        assert!(self.opcode.has_dest(), "{} has no destination", self.opcode);
        self.dest = Some(dest);
    }

    /// Source registers in operand order.
    #[must_use]
    pub fn srcs(&self) -> &[Reg] {
        &self.srcs
    }

    /// Number of source registers.
    #[must_use]
    pub fn srcs_size(&self) -> usize {
        self.srcs.len()
    }

    /// Source register `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.srcs_size()`.
    #[must_use]
    pub fn src(&self, index: usize) -> Reg {
        assert!(
            index < self.srcs.len(),
            "{}: source {index} out of range ({} sources)",
            self.opcode,
            self.srcs.len()
        );
        self.srcs[index]
    }

    /// Replaces source register `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.srcs_size()`.
    pub fn set_src(&mut self, index: usize, reg: Reg) {
        assert!(
            index < self.srcs.len(),
            "{}: source {index} out of range ({} sources)",
            self.opcode,
            self.srcs.len()
        );
        self.srcs[index] = reg;
    }

    /// Replaces all source registers.
    pub fn set_srcs(&mut self, srcs: Vec<Reg>) {
        self.srcs = srcs;
    }

    /// Source `index` is a register pair. Invokes consult the callee prototype, counting the
    /// receiver for every kind but `invoke-static`.
    #[must_use]
    pub fn src_is_wide(&self, index: usize) -> bool {
        if !self.opcode.is_invoke() {
            return self.opcode.src_is_wide(index);
        }
        let Operand::Method(method) = &self.operand else {
            return false;
        };
        let arg = if self.opcode.is_static_invoke() {
            Some(index)
        } else {
            index.checked_sub(1)
        };
        arg.and_then(|i| method.proto().args.get(i))
            .is_some_and(TypeRef::is_wide)
    }

    /// The destination is a register pair.
    #[must_use]
    pub fn dest_is_wide(&self) -> bool {
        self.opcode.flags().contains(crate::ir::OpcodeFlags::DEST_WIDE)
    }

    /// The result of this instruction is picked up by a `move-result-pseudo*`.
    #[must_use]
    pub fn has_move_result_pseudo(&self) -> bool {
        self.opcode.has_move_result_pseudo()
    }

    /// The result of this instruction is picked up by any kind of result move.
    #[must_use]
    pub fn has_move_result_any(&self) -> bool {
        self.opcode.has_move_result_any()
    }

    /// Can raise an exception.
    #[must_use]
    pub fn may_throw(&self) -> bool {
        self.opcode.may_throw()
    }

    /// The payload.
    #[must_use]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    /// Replaces the payload.
    ///
    /// # Panics
    ///
    /// Panics if the payload variant does not match the opcode.
    pub fn set_operand(&mut self, operand: Operand) {
        assert_eq!(
            operand.kind(),
            self.opcode.ref_kind(),
            "{} cannot carry a {:?} payload",
            self.opcode,
            operand.kind()
        );
        self.operand = operand;
    }

    /// The literal payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no literal.
    #[must_use]
    pub fn get_literal(&self) -> i64 {
        match self.operand {
            Operand::Literal(v) => v,
            _ => self.wrong_payload(RefKind::Literal),
        }
    }

    /// Sets the literal payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no literal.
    pub fn set_literal(&mut self, value: i64) {
        self.set_operand(Operand::Literal(value));
    }

    /// The string payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no string.
    #[must_use]
    pub fn get_string(&self) -> &StringRef {
        match &self.operand {
            Operand::String(s) => s,
            _ => self.wrong_payload(RefKind::String),
        }
    }

    /// The type payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no type.
    #[must_use]
    pub fn get_type(&self) -> &TypeRef {
        match &self.operand {
            Operand::Type(t) => t,
            _ => self.wrong_payload(RefKind::Type),
        }
    }

    /// The field payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no field.
    #[must_use]
    pub fn get_field(&self) -> &FieldRef {
        match &self.operand {
            Operand::Field(fr) => fr,
            _ => self.wrong_payload(RefKind::Field),
        }
    }

    /// The method payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no method.
    #[must_use]
    pub fn get_method(&self) -> &MethodRef {
        match &self.operand {
            Operand::Method(m) => m,
            _ => self.wrong_payload(RefKind::Method),
        }
    }

    /// The array payload.
    ///
    /// # Panics
    ///
    /// Panics if the opcode carries no array data.
    #[must_use]
    pub fn get_data(&self) -> &DataRef {
        match &self.operand {
            Operand::Data(d) => d,
            _ => self.wrong_payload(RefKind::Data),
        }
    }

    fn wrong_payload(&self, wanted: RefKind) -> ! {
        panic!(
            "{} carries a {:?} payload, not {wanted:?}",
            self.opcode,
            self.operand.kind()
        )
    }

    /// One past the highest register this instruction touches, counting pairs.
    #[must_use]
    pub fn register_end(&self) -> Reg {
        let dest = self
            .dest
            .map_or(0, |d| d + if self.dest_is_wide() { 2 } else { 1 });
        self.srcs
            .iter()
            .enumerate()
            .map(|(i, &r)| r + if self.src_is_wide(i) { 2 } else { 1 })
            .fold(dest, Reg::max)
    }

    /// Rewrites every register through `f`.
    pub fn remap_registers(&mut self, f: impl Fn(Reg) -> Reg) {
        if let Some(dest) = self.dest.as_mut() {
            *dest = f(*dest);
        }
        for src in &mut self.srcs {
            *src = f(*src);
        }
    }
}

impl fmt::Display for IrInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        if let Some(dest) = self.dest {
            write!(f, " v{dest}")?;
        }
        for src in &self.srcs {
            write!(f, " v{src}")?;
        }
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RefPool;

    #[test]
    fn literal_defaults_to_zero() {
        let insn = IrInstruction::new(IrOpcode::Const).with_dest(0);
        assert_eq!(insn.get_literal(), 0);
        assert_eq!(insn.to_string(), "const v0 0");
    }

    #[test]
    #[should_panic(expected = "not Type")]
    fn wrong_accessor_panics() {
        let insn = IrInstruction::new(IrOpcode::Const).with_dest(0);
        let _ = insn.get_type();
    }

    #[test]
    #[should_panic(expected = "cannot carry")]
    fn mismatched_payload_panics() {
        let _ = IrInstruction::new(IrOpcode::Const).with_type(TypeRef::new("I"));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn src_past_end_panics() {
        let insn = IrInstruction::new(IrOpcode::Move).with_dest(0).with_srcs([1]);
        let _ = insn.src(1);
    }

    #[test]
    fn invoke_wideness_follows_prototype() {
        let pool = RefPool::new();
        let virt = IrInstruction::new(IrOpcode::InvokeVirtual)
            .with_srcs([0, 1, 3])
            .with_method(pool.method("LFoo;", "f", "(JI)V").unwrap());
        assert!(!virt.src_is_wide(0));
        assert!(virt.src_is_wide(1));
        assert!(!virt.src_is_wide(2));
        assert_eq!(virt.register_end(), 4);

        let stat = IrInstruction::new(IrOpcode::InvokeStatic)
            .with_srcs([0])
            .with_method(pool.method("LFoo;", "g", "(J)V").unwrap());
        assert!(stat.src_is_wide(0));
        assert_eq!(stat.register_end(), 2);
    }

    #[test]
    fn set_opcode_drops_dest() {
        let mut insn = IrInstruction::new(IrOpcode::Move).with_dest(2).with_srcs([1]);
        insn.set_opcode(IrOpcode::Return);
        assert_eq!(insn.dest(), None);
        assert_eq!(insn.srcs(), &[1]);
    }

    #[test]
    fn remap_and_register_end() {
        let mut insn = IrInstruction::new(IrOpcode::AddLong)
            .with_dest(0)
            .with_srcs([2, 4]);
        assert_eq!(insn.register_end(), 6);
        insn.remap_registers(|r| r + 10);
        assert_eq!(insn.to_string(), "add-long v10 v12 v14");
    }
}
