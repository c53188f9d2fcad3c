//! The flat instruction stream.
//!
//! [`IrCode`] is what a method body looks like before a graph is built and after it is
//! linearized: an ordered list of [`IrEntry`] values where control flow is expressed with
//! labels, branch side tables and try-region markers.
//!
//! ```rust
//! use dexflow::ir::{IrCode, IrInstruction, IrOpcode};
//!
//! let mut code = IrCode::new();
//! let done = code.new_label();
//! code.push(IrInstruction::new(IrOpcode::LoadParam).with_dest(0));
//! code.push_branch(IrInstruction::new(IrOpcode::IfEqz).with_srcs([0]), done);
//! code.push(IrInstruction::new(IrOpcode::Const).with_dest(0).with_literal(1));
//! code.bind(done);
//! code.push(IrInstruction::new(IrOpcode::Return).with_srcs([0]));
//!
//! assert_eq!(code.insn_count(), 4);
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use crate::ir::{
    instruction::{IrInstruction, Reg},
    opcode::IrOpcode,
    refs::{MethodRef, StringRef, TypeRef},
};

/// A jump target inside one [`IrCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(u32);

impl LabelId {
    /// Wraps a raw label number.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        LabelId(index)
    }

    /// The raw label number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A try region inside one [`IrCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TryId(u32);

impl TryId {
    /// The raw region number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// One handler of a try region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatchHandler {
    /// Caught exception type; `None` catches everything.
    pub catch_type: Option<TypeRef>,
    /// Where the handler code starts.
    pub handler: LabelId,
}

impl CatchHandler {
    /// A handler for `catch_type`.
    #[must_use]
    pub fn typed(catch_type: TypeRef, handler: LabelId) -> Self {
        CatchHandler {
            catch_type: Some(catch_type),
            handler,
        }
    }

    /// A catch-all handler.
    #[must_use]
    pub fn catch_all(handler: LabelId) -> Self {
        CatchHandler {
            catch_type: None,
            handler,
        }
    }
}

/// A branch target recorded for a branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchTarget {
    /// The case value for a switch arm, `None` for `goto` and `if-*`.
    pub case_key: Option<i32>,
    /// The destination.
    pub label: LabelId,
}

/// A source line marker. Inlined code keeps its own positions and points at the call site
/// through `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// The method the line belongs to, if known.
    pub method: Option<MethodRef>,
    /// Source file name.
    pub file: StringRef,
    /// Line number.
    pub line: u32,
    /// The position this one was inlined into.
    pub parent: Option<Arc<SourcePosition>>,
}

impl SourcePosition {
    /// A top-level position.
    #[must_use]
    pub fn new(file: StringRef, line: u32) -> Self {
        SourcePosition {
            method: None,
            file,
            line,
            parent: None,
        }
    }

    /// Walks to the outermost position of the inlining chain.
    #[must_use]
    pub fn root(&self) -> &SourcePosition {
        let mut pos = self;
        while let Some(parent) = &pos.parent {
            pos = parent;
        }
        pos
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "{method}@")?;
        }
        write!(f, "{}:{}", self.file.as_str(), self.line)?;
        if let Some(parent) = &self.parent {
            write!(f, " <- {parent}")?;
        }
        Ok(())
    }
}

/// Local-variable and prologue markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebugInfo {
    /// A named local becomes live in `reg`.
    StartLocal {
        /// Register holding the local.
        reg: Reg,
        /// Variable name.
        name: StringRef,
        /// Declared type.
        ty: TypeRef,
    },
    /// The local in the register goes out of scope.
    EndLocal(Reg),
    /// A previously ended local comes back into scope.
    RestartLocal(Reg),
    /// End of the method prologue.
    PrologueEnd,
    /// Start of the method epilogue.
    EpilogueBegin,
}

impl DebugInfo {
    /// Rewrites the register this marker refers to.
    pub fn remap_registers(&mut self, f: impl Fn(Reg) -> Reg) {
        match self {
            DebugInfo::StartLocal { reg, .. }
            | DebugInfo::EndLocal(reg)
            | DebugInfo::RestartLocal(reg) => *reg = f(*reg),
            DebugInfo::PrologueEnd | DebugInfo::EpilogueBegin => {}
        }
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugInfo::StartLocal { reg, name, ty } => {
                write!(f, "start-local v{reg} {} {ty}", name.as_str())
            }
            DebugInfo::EndLocal(reg) => write!(f, "end-local v{reg}"),
            DebugInfo::RestartLocal(reg) => write!(f, "restart-local v{reg}"),
            DebugInfo::PrologueEnd => f.write_str("prologue-end"),
            DebugInfo::EpilogueBegin => f.write_str("epilogue-begin"),
        }
    }
}

/// One entry of the flat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrEntry {
    /// An instruction. Branch targets live in the [`IrCode`] side table.
    Insn(IrInstruction),
    /// A jump target.
    Label(LabelId),
    /// Start of a try region.
    TryStart(TryId),
    /// End of a try region.
    TryEnd(TryId),
    /// A source line marker.
    Position(SourcePosition),
    /// A debug marker.
    Debug(DebugInfo),
}

/// A method body as a flat list of entries.
#[derive(Debug, Clone, Default)]
pub struct IrCode {
    entries: Vec<IrEntry>,
    targets: HashMap<usize, Vec<BranchTarget>>,
    tries: Vec<Vec<CatchHandler>>,
    next_label: u32,
    registers_size: u32,
}

impl IrCode {
    /// An empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a non-branch instruction.
    ///
    /// # Panics
    ///
    /// Panics on `goto`, `if-*` and `switch`, which need targets; use
    /// [`IrCode::push_goto`], [`IrCode::push_branch`] or [`IrCode::push_switch`].
    pub fn push(&mut self, insn: IrInstruction) {
        assert!(
            !insn.opcode().is_branch(),
            "{} needs a target; push it with its branch helper",
            insn.opcode()
        );
        self.note_registers(&insn);
        self.entries.push(IrEntry::Insn(insn));
    }

    /// Allocates a fresh, unbound label.
    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.next_label);
        self.next_label += 1;
        label
    }

    /// Binds `label` to the current end of the stream.
    pub fn bind(&mut self, label: LabelId) {
        self.next_label = self.next_label.max(label.0 + 1);
        self.entries.push(IrEntry::Label(label));
    }

    /// Appends an unconditional jump.
    pub fn push_goto(&mut self, target: LabelId) {
        self.push_with_targets(
            IrInstruction::new(IrOpcode::Goto),
            vec![BranchTarget {
                case_key: None,
                label: target,
            }],
        );
    }

    /// Appends a conditional branch taken to `target`.
    ///
    /// # Panics
    ///
    /// Panics if `insn` is not an `if-*`.
    pub fn push_branch(&mut self, insn: IrInstruction, target: LabelId) {
        assert!(
            insn.opcode().is_conditional_branch(),
            "{} is not a conditional branch",
            insn.opcode()
        );
        self.push_with_targets(
            insn,
            vec![BranchTarget {
                case_key: None,
                label: target,
            }],
        );
    }

    /// Appends a switch with its `(key, target)` arms. The default falls through.
    ///
    /// # Panics
    ///
    /// Panics if `insn` is not a `switch`.
    pub fn push_switch(
        &mut self,
        insn: IrInstruction,
        cases: impl IntoIterator<Item = (i32, LabelId)>,
    ) {
        assert!(insn.opcode().is_switch(), "{} is not a switch", insn.opcode());
        let targets = cases
            .into_iter()
            .map(|(key, label)| BranchTarget {
                case_key: Some(key),
                label,
            })
            .collect();
        self.push_with_targets(insn, targets);
    }

    fn push_with_targets(&mut self, insn: IrInstruction, targets: Vec<BranchTarget>) {
        self.note_registers(&insn);
        self.targets.insert(self.entries.len(), targets);
        self.entries.push(IrEntry::Insn(insn));
    }

    /// Opens a try region covered by `handlers`, in priority order.
    pub fn push_try(&mut self, handlers: Vec<CatchHandler>) -> TryId {
        let id = TryId(self.tries.len() as u32);
        self.tries.push(handlers);
        self.entries.push(IrEntry::TryStart(id));
        id
    }

    /// Closes the try region `id`.
    pub fn push_try_end(&mut self, id: TryId) {
        self.entries.push(IrEntry::TryEnd(id));
    }

    /// Appends a source position marker.
    pub fn push_position(&mut self, position: SourcePosition) {
        self.entries.push(IrEntry::Position(position));
    }

    /// Appends a debug marker.
    pub fn push_debug(&mut self, info: DebugInfo) {
        self.entries.push(IrEntry::Debug(info));
    }

    /// All entries in order.
    #[must_use]
    pub fn entries(&self) -> &[IrEntry] {
        &self.entries
    }

    /// Targets of the branch instruction at entry `index`; empty for anything else.
    #[must_use]
    pub fn targets(&self, index: usize) -> &[BranchTarget] {
        self.targets.get(&index).map_or(&[], Vec::as_slice)
    }

    /// Handlers of try region `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this stream.
    #[must_use]
    pub fn handlers(&self, id: TryId) -> &[CatchHandler] {
        &self.tries[id.0 as usize]
    }

    /// Instructions in order, markers skipped.
    pub fn instructions(&self) -> impl Iterator<Item = &IrInstruction> {
        self.entries.iter().filter_map(|entry| match entry {
            IrEntry::Insn(insn) => Some(insn),
            _ => None,
        })
    }

    /// Number of instructions.
    #[must_use]
    pub fn insn_count(&self) -> usize {
        self.instructions().count()
    }

    /// Registers the body uses: at least one past the highest register any instruction
    /// touches.
    #[must_use]
    pub fn registers_size(&self) -> u32 {
        self.registers_size
    }

    /// Raises or lowers the declared register count.
    pub fn set_registers_size(&mut self, size: u32) {
        self.registers_size = size;
    }

    fn note_registers(&mut self, insn: &IrInstruction) {
        self.registers_size = self.registers_size.max(insn.register_end());
    }
}

/// Prints one entry per line with labels and try regions renumbered in order of
/// appearance, so that equivalent streams print identically.
impl fmt::Display for IrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: HashMap<LabelId, usize> = HashMap::new();
        let mut tries: HashMap<TryId, usize> = HashMap::new();
        for entry in &self.entries {
            match entry {
                IrEntry::Label(l) => {
                    let next = labels.len();
                    labels.entry(*l).or_insert(next);
                }
                IrEntry::TryStart(t) => {
                    let next = tries.len();
                    tries.entry(*t).or_insert(next);
                }
                _ => {}
            }
        }
        let label = |l: &LabelId| {
            labels
                .get(l)
                .map_or_else(|| format!(":?{}", l.0), |n| format!(":L{n}"))
        };

        for (index, entry) in self.entries.iter().enumerate() {
            match entry {
                IrEntry::Insn(insn) if insn.opcode().is_switch() => {
                    write!(f, "  {insn} [")?;
                    for (i, target) in self.targets(index).iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(
                            f,
                            "{} -> {}",
                            target.case_key.unwrap_or_default(),
                            label(&target.label)
                        )?;
                    }
                    writeln!(f, "]")?;
                }
                IrEntry::Insn(insn) => {
                    write!(f, "  {insn}")?;
                    for target in self.targets(index) {
                        write!(f, " {}", label(&target.label))?;
                    }
                    writeln!(f)?;
                }
                IrEntry::Label(l) => writeln!(f, "{}", label(l))?,
                IrEntry::TryStart(t) => {
                    write!(f, ".try_start T{} (", tries[t])?;
                    for (i, handler) in self.handlers(*t).iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        match &handler.catch_type {
                            Some(ty) => write!(f, "{ty}")?,
                            None => f.write_str("*")?,
                        }
                        write!(f, " -> {}", label(&handler.handler))?;
                    }
                    writeln!(f, ")")?;
                }
                IrEntry::TryEnd(t) => match tries.get(t) {
                    Some(n) => writeln!(f, ".try_end T{n}")?,
                    None => writeln!(f, ".try_end T?{}", t.0)?,
                },
                IrEntry::Position(pos) => writeln!(f, ".pos {pos}")?,
                IrEntry::Debug(info) => writeln!(f, ".dbg {info}")?,
            }
        }
        Ok(())
    }
}
