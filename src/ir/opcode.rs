//! Opcode set and static opcode properties.
//!
//! The opcode set follows the Dalvik instruction set at the IR level: there are no
//! register-width encodings (`move/16`, `const/4`, ...), a single `switch` replaces the
//! packed and sparse forms, and a handful of pseudo-opcodes model things the binary format
//! expresses differently:
//!
//! - `load-param*` materializes a parameter into a register at method entry.
//! - `move-result-pseudo*` carries the result of an instruction that may throw, so that the
//!   throwing half can end a basic block while the result write starts the next one.
//!
//! Every property query is answered from one [`OpcodeFlags`] table so that classification is
//! consistent across the builder, the mutation layer and the dataflow passes.

use bitflags::bitflags;
use strum::{EnumCount, EnumIter, IntoStaticStr};

bitflags! {
    /// Static properties of an [`IrOpcode`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpcodeFlags: u32 {
        /// Writes a destination register.
        const HAS_DEST = 1 << 0;
        /// The destination is a register pair.
        const DEST_WIDE = 1 << 1;
        /// The destination holds a reference.
        const DEST_OBJECT = 1 << 2;
        /// Can raise an exception.
        const MAY_THROW = 1 << 3;
        /// The result is delivered by a trailing `move-result-pseudo*`.
        const PSEUDO_RESULT = 1 << 4;
        /// The result is delivered by a trailing `move-result*`.
        const MOVE_RESULT = 1 << 5;
        /// The first source is a register pair.
        const SRC0_WIDE = 1 << 6;
        /// The second source is a register pair.
        const SRC1_WIDE = 1 << 7;
        /// Transfers control: `goto`, `if-*` or `switch`.
        const BRANCH = 1 << 8;
        /// Two-way conditional branch.
        const CONDITIONAL = 1 << 9;
        /// Multi-way branch.
        const SWITCH = 1 << 10;
        /// Leaves the method normally.
        const RETURN = 1 << 11;
        /// Raises its operand.
        const THROW = 1 << 12;
        /// Calls a method.
        const INVOKE = 1 << 13;
        /// Observable beyond its destination register.
        const SIDE_EFFECTS = 1 << 14;
        /// Parameter materialization at method entry.
        const LOAD_PARAM = 1 << 15;
        /// Reads the pending result of the preceding instruction.
        const READS_RESULT = 1 << 16;
    }
}

/// Which payload an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// No payload.
    None,
    /// An integer literal.
    Literal,
    /// A string constant.
    String,
    /// A type descriptor.
    Type,
    /// A field reference.
    Field,
    /// A method reference.
    Method,
    /// A typed data blob (array payloads).
    Data,
}

/// IR opcodes.
///
/// Mnemonics are the kebab-case form of the variant name (`IfEqz` is `if-eqz`), available
/// through [`IrOpcode::mnemonic`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
#[allow(missing_docs)]
pub enum IrOpcode {
    Nop,
    Move,
    MoveWide,
    MoveObject,
    MoveResult,
    MoveResultWide,
    MoveResultObject,
    MoveResultPseudo,
    MoveResultPseudoWide,
    MoveResultPseudoObject,
    MoveException,
    ReturnVoid,
    Return,
    ReturnWide,
    ReturnObject,
    Const,
    ConstWide,
    ConstString,
    ConstClass,
    MonitorEnter,
    MonitorExit,
    CheckCast,
    InstanceOf,
    ArrayLength,
    NewInstance,
    NewArray,
    FilledNewArray,
    FillArrayData,
    Throw,
    Goto,
    Switch,
    CmpLong,
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfEqz,
    IfNez,
    IfLtz,
    IfGez,
    IfGtz,
    IfLez,
    Aget,
    AgetWide,
    AgetObject,
    Aput,
    AputWide,
    AputObject,
    Iget,
    IgetWide,
    IgetObject,
    Iput,
    IputWide,
    IputObject,
    Sget,
    SgetWide,
    SgetObject,
    Sput,
    SputWide,
    SputObject,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeStatic,
    InvokeInterface,
    NegInt,
    NotInt,
    IntToLong,
    LongToInt,
    AddInt,
    SubInt,
    MulInt,
    DivInt,
    RemInt,
    AndInt,
    OrInt,
    XorInt,
    ShlInt,
    AddLong,
    SubLong,
    AddIntLit,
    MulIntLit,
    DivIntLit,
    LoadParam,
    LoadParamWide,
    LoadParamObject,
}

impl IrOpcode {
    /// The property table entry for this opcode.
    #[must_use]
    pub const fn flags(self) -> OpcodeFlags {
        use IrOpcode::*;

        const DEST: u32 = OpcodeFlags::HAS_DEST.bits();
        const WIDE: u32 = OpcodeFlags::HAS_DEST.bits() | OpcodeFlags::DEST_WIDE.bits();
        const OBJ: u32 = OpcodeFlags::HAS_DEST.bits() | OpcodeFlags::DEST_OBJECT.bits();
        const THROWS: u32 = OpcodeFlags::MAY_THROW.bits();
        const PSEUDO: u32 = OpcodeFlags::MAY_THROW.bits() | OpcodeFlags::PSEUDO_RESULT.bits();
        const EFFECT: u32 = OpcodeFlags::SIDE_EFFECTS.bits();
        const STORE: u32 = OpcodeFlags::MAY_THROW.bits() | OpcodeFlags::SIDE_EFFECTS.bits();
        const IF: u32 = OpcodeFlags::BRANCH.bits()
            | OpcodeFlags::CONDITIONAL.bits()
            | OpcodeFlags::SIDE_EFFECTS.bits();
        const RET: u32 = OpcodeFlags::RETURN.bits() | OpcodeFlags::SIDE_EFFECTS.bits();
        const CALL: u32 = OpcodeFlags::INVOKE.bits()
            | OpcodeFlags::MAY_THROW.bits()
            | OpcodeFlags::MOVE_RESULT.bits()
            | OpcodeFlags::SIDE_EFFECTS.bits();
        const PARAM: u32 = OpcodeFlags::LOAD_PARAM.bits() | OpcodeFlags::SIDE_EFFECTS.bits();
        const RESULT: u32 = OpcodeFlags::READS_RESULT.bits();
        const S0W: u32 = OpcodeFlags::SRC0_WIDE.bits();
        const S1W: u32 = OpcodeFlags::SRC1_WIDE.bits();

        let bits = match self {
            Nop => 0,
            Move => DEST,
            MoveWide => WIDE | S0W,
            MoveObject => OBJ,
            MoveResult | MoveResultPseudo => DEST | RESULT,
            MoveResultWide | MoveResultPseudoWide => WIDE | RESULT,
            MoveResultObject | MoveResultPseudoObject => OBJ | RESULT,
            MoveException => OBJ,
            ReturnVoid | Return | ReturnObject => RET,
            ReturnWide => RET | S0W,
            Const => DEST,
            ConstWide => WIDE,
            ConstString | ConstClass => PSEUDO,
            MonitorEnter | MonitorExit => STORE,
            CheckCast | InstanceOf | ArrayLength | NewInstance | NewArray => PSEUDO,
            FilledNewArray => THROWS | OpcodeFlags::MOVE_RESULT.bits(),
            FillArrayData => STORE,
            Throw => OpcodeFlags::THROW.bits() | THROWS | EFFECT,
            Goto => OpcodeFlags::BRANCH.bits() | EFFECT,
            Switch => OpcodeFlags::BRANCH.bits() | OpcodeFlags::SWITCH.bits() | EFFECT,
            CmpLong => DEST | S0W | S1W,
            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => IF,
            IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez => IF,
            Aget | AgetWide | AgetObject => PSEUDO,
            Aput | AputObject => STORE,
            AputWide => STORE | S0W,
            Iget | IgetWide | IgetObject => PSEUDO,
            Iput | IputObject => STORE,
            IputWide => STORE | S0W,
            Sget | SgetWide | SgetObject => PSEUDO,
            Sput | SputObject => STORE,
            SputWide => STORE | S0W,
            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface => CALL,
            NegInt | NotInt => DEST,
            IntToLong => WIDE,
            LongToInt => DEST | S0W,
            AddInt | SubInt | MulInt | AndInt | OrInt | XorInt | ShlInt => DEST,
            DivInt | RemInt => PSEUDO,
            AddLong | SubLong => WIDE | S0W | S1W,
            AddIntLit | MulIntLit => DEST,
            DivIntLit => PSEUDO,
            LoadParam => DEST | PARAM,
            LoadParamWide => WIDE | PARAM,
            LoadParamObject => OBJ | PARAM,
        };
        OpcodeFlags::from_bits_truncate(bits)
    }

    /// The payload this opcode carries.
    #[must_use]
    pub const fn ref_kind(self) -> RefKind {
        use IrOpcode::*;
        match self {
            Const | ConstWide | AddIntLit | MulIntLit | DivIntLit => RefKind::Literal,
            ConstString => RefKind::String,
            ConstClass | CheckCast | InstanceOf | NewInstance | NewArray | FilledNewArray => {
                RefKind::Type
            }
            FillArrayData => RefKind::Data,
            Iget | IgetWide | IgetObject | Iput | IputWide | IputObject | Sget | SgetWide
            | SgetObject | Sput | SputWide | SputObject => RefKind::Field,
            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface => {
                RefKind::Method
            }
            _ => RefKind::None,
        }
    }

    /// The textual mnemonic, e.g. `move-result-pseudo-object`.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns `true` if every bit of `flags` is set for this opcode.
    #[must_use]
    pub const fn has(self, flags: OpcodeFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Writes a destination register.
    #[must_use]
    pub const fn has_dest(self) -> bool {
        self.has(OpcodeFlags::HAS_DEST)
    }

    /// Can raise an exception.
    #[must_use]
    pub const fn may_throw(self) -> bool {
        self.has(OpcodeFlags::MAY_THROW)
    }

    /// Delivers its result through a trailing `move-result-pseudo*`.
    #[must_use]
    pub const fn has_move_result_pseudo(self) -> bool {
        self.has(OpcodeFlags::PSEUDO_RESULT)
    }

    /// Delivers its result through a trailing `move-result*` (invokes, `filled-new-array`).
    #[must_use]
    pub const fn has_move_result(self) -> bool {
        self.has(OpcodeFlags::MOVE_RESULT)
    }

    /// Either kind of trailing result move.
    #[must_use]
    pub const fn has_move_result_any(self) -> bool {
        self.has_move_result() || self.has_move_result_pseudo()
    }

    /// One of the `move-result-pseudo*` opcodes.
    #[must_use]
    pub const fn is_move_result_pseudo(self) -> bool {
        matches!(
            self,
            IrOpcode::MoveResultPseudo
                | IrOpcode::MoveResultPseudoWide
                | IrOpcode::MoveResultPseudoObject
        )
    }

    /// One of the `move-result*` or `move-result-pseudo*` opcodes.
    #[must_use]
    pub const fn is_move_result_any(self) -> bool {
        self.has(OpcodeFlags::READS_RESULT)
    }

    /// One of the five invoke kinds.
    #[must_use]
    pub const fn is_invoke(self) -> bool {
        self.has(OpcodeFlags::INVOKE)
    }

    /// `invoke-static`: the first source is not a receiver.
    #[must_use]
    pub const fn is_static_invoke(self) -> bool {
        matches!(self, IrOpcode::InvokeStatic)
    }

    /// `goto`.
    #[must_use]
    pub const fn is_goto(self) -> bool {
        matches!(self, IrOpcode::Goto)
    }

    /// One of the twelve `if-*` opcodes.
    #[must_use]
    pub const fn is_conditional_branch(self) -> bool {
        self.has(OpcodeFlags::CONDITIONAL)
    }

    /// `switch`.
    #[must_use]
    pub const fn is_switch(self) -> bool {
        self.has(OpcodeFlags::SWITCH)
    }

    /// `goto`, `if-*` or `switch`.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        self.has(OpcodeFlags::BRANCH)
    }

    /// One of the return opcodes.
    #[must_use]
    pub const fn is_return(self) -> bool {
        self.has(OpcodeFlags::RETURN)
    }

    /// `throw`.
    #[must_use]
    pub const fn is_throw(self) -> bool {
        self.has(OpcodeFlags::THROW)
    }

    /// Control never falls through to the next instruction.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.is_return() || self.is_throw() || self.is_goto()
    }

    /// One of the `load-param*` pseudo-opcodes.
    #[must_use]
    pub const fn is_load_param(self) -> bool {
        self.has(OpcodeFlags::LOAD_PARAM)
    }

    /// `filled-new-array`.
    #[must_use]
    pub const fn is_filled_new_array(self) -> bool {
        matches!(self, IrOpcode::FilledNewArray)
    }

    /// Observable beyond the destination register, so never removable by liveness alone.
    #[must_use]
    pub const fn has_side_effects(self) -> bool {
        self.has(OpcodeFlags::SIDE_EFFECTS)
    }

    /// Source `index` is a register pair. Invokes depend on their prototype and are
    /// answered by [`IrInstruction::src_is_wide`](crate::ir::IrInstruction::src_is_wide).
    #[must_use]
    pub const fn src_is_wide(self, index: usize) -> bool {
        match index {
            0 => self.has(OpcodeFlags::SRC0_WIDE),
            1 => self.has(OpcodeFlags::SRC1_WIDE),
            _ => false,
        }
    }

    /// The `move-result-pseudo*` flavour that receives this opcode's result.
    #[must_use]
    pub const fn pseudo_result(self) -> Option<IrOpcode> {
        use IrOpcode::*;
        if !self.has_move_result_pseudo() {
            return None;
        }
        Some(match self {
            AgetWide | IgetWide | SgetWide => MoveResultPseudoWide,
            ConstString | ConstClass | CheckCast | NewInstance | NewArray | AgetObject
            | IgetObject | SgetObject => MoveResultPseudoObject,
            _ => MoveResultPseudo,
        })
    }

    /// The register move matching a `load-param*` or a value-carrying return.
    #[must_use]
    pub const fn lowered_move(self) -> Option<IrOpcode> {
        use IrOpcode::*;
        match self {
            LoadParam | Return => Some(Move),
            LoadParamWide | ReturnWide => Some(MoveWide),
            LoadParamObject | ReturnObject => Some(MoveObject),
            _ => None,
        }
    }
}

impl std::fmt::Display for IrOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn mnemonics() {
        assert_eq!(IrOpcode::MoveResultPseudoObject.mnemonic(), "move-result-pseudo-object");
        assert_eq!(IrOpcode::IfEqz.mnemonic(), "if-eqz");
        assert_eq!(IrOpcode::AddIntLit.to_string(), "add-int-lit");
        assert_eq!(IrOpcode::InvokeStatic.mnemonic(), "invoke-static");
    }

    #[test]
    fn every_pseudo_result_opcode_may_throw_and_has_no_dest() {
        for op in IrOpcode::iter() {
            if op.has_move_result_pseudo() {
                assert!(op.may_throw(), "{op}");
                assert!(!op.has_dest(), "{op}");
                assert!(op.pseudo_result().is_some(), "{op}");
            } else {
                assert!(op.pseudo_result().is_none(), "{op}");
            }
        }
    }

    #[test]
    fn branch_classification() {
        let conditionals = IrOpcode::iter()
            .filter(|op| op.is_conditional_branch())
            .count();
        assert_eq!(conditionals, 12);
        assert!(IrOpcode::Switch.is_branch());
        assert!(!IrOpcode::Switch.is_conditional_branch());
        assert!(IrOpcode::Goto.is_terminal());
        assert!(IrOpcode::Throw.may_throw());
    }

    #[test]
    fn side_effect_table() {
        for op in [
            IrOpcode::ReturnVoid,
            IrOpcode::MonitorEnter,
            IrOpcode::FillArrayData,
            IrOpcode::Throw,
            IrOpcode::IfNez,
            IrOpcode::Switch,
            IrOpcode::AputWide,
            IrOpcode::Iput,
            IrOpcode::SputObject,
            IrOpcode::InvokeInterface,
            IrOpcode::LoadParamWide,
        ] {
            assert!(op.has_side_effects(), "{op}");
        }
        for op in [IrOpcode::Const, IrOpcode::Iget, IrOpcode::FilledNewArray] {
            assert!(!op.has_side_effects(), "{op}");
        }
    }

    #[test]
    fn pseudo_result_flavours() {
        assert_eq!(
            IrOpcode::IgetWide.pseudo_result(),
            Some(IrOpcode::MoveResultPseudoWide)
        );
        assert_eq!(
            IrOpcode::CheckCast.pseudo_result(),
            Some(IrOpcode::MoveResultPseudoObject)
        );
        assert_eq!(
            IrOpcode::DivInt.pseudo_result(),
            Some(IrOpcode::MoveResultPseudo)
        );
    }

    #[test]
    fn lowering_moves() {
        assert_eq!(IrOpcode::LoadParamWide.lowered_move(), Some(IrOpcode::MoveWide));
        assert_eq!(IrOpcode::ReturnObject.lowered_move(), Some(IrOpcode::MoveObject));
        assert_eq!(IrOpcode::ReturnVoid.lowered_move(), None);
    }

    #[test]
    fn wide_sources() {
        assert!(IrOpcode::AddLong.src_is_wide(1));
        assert!(IrOpcode::AputWide.src_is_wide(0));
        assert!(!IrOpcode::AputWide.src_is_wide(1));
        assert_eq!(IrOpcode::COUNT, IrOpcode::iter().count());
    }
}
