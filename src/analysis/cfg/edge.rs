//! Control flow edge types for the CFG.
//!
//! Edges are owned by the graph's edge arena and addressed by [`EdgeId`]. Each block keeps
//! its incoming and outgoing edge ids as derived indexes; only the graph's edge routines
//! touch both sides, so the indexes never disagree with the arena.

use std::fmt;

use crate::{analysis::cfg::BlockId, ir::TypeRef};

/// Identity of an edge inside one graph. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

impl EdgeId {
    /// The raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Coarse edge classification used by the typed successor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// Fallthrough or unconditional jump.
    Goto,
    /// Taken conditional branch or switch case.
    Branch,
    /// Exceptional control flow into a handler.
    Throw,
}

/// The kind of control flow represented by an edge.
///
/// # Examples
///
/// ```rust
/// use dexflow::analysis::{CfgEdgeKind, EdgeType};
///
/// let case = CfgEdgeKind::Branch { case_key: Some(3) };
/// assert!(case.is_switch_case());
/// assert_eq!(case.edge_type(), EdgeType::Branch);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CfgEdgeKind {
    /// Control continues here when nothing else is taken: the fallthrough of a plain
    /// block, the not-taken side of an `if-*`, the default of a `switch`, or a removed
    /// `goto`.
    Goto,

    /// A taken branch.
    Branch {
        /// `Some(key)` for a switch case, `None` for the taken side of an `if-*`.
        case_key: Option<i32>,
    },

    /// Edge to an exception handler.
    Throw {
        /// Position of the handler among its siblings; lower indices are tried first.
        index: u32,
        /// Caught exception type, or `None` for a catch-all handler.
        catch_type: Option<TypeRef>,
    },
}

impl CfgEdgeKind {
    /// The coarse classification.
    #[must_use]
    pub const fn edge_type(&self) -> EdgeType {
        match self {
            Self::Goto => EdgeType::Goto,
            Self::Branch { .. } => EdgeType::Branch,
            Self::Throw { .. } => EdgeType::Throw,
        }
    }

    /// Returns `true` for the taken side of a conditional branch.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::Branch { case_key: None })
    }

    /// Returns `true` for a switch case.
    #[must_use]
    pub const fn is_switch_case(&self) -> bool {
        matches!(self, Self::Branch { case_key: Some(_) })
    }

    /// Returns `true` for an edge into a handler.
    #[must_use]
    pub const fn is_exceptional(&self) -> bool {
        matches!(self, Self::Throw { .. })
    }
}

impl fmt::Display for CfgEdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goto => f.write_str("goto"),
            Self::Branch { case_key: None } => f.write_str("branch"),
            Self::Branch {
                case_key: Some(key),
            } => write!(f, "case {key}"),
            Self::Throw {
                index,
                catch_type: Some(ty),
            } => write!(f, "catch#{index} {ty}"),
            Self::Throw {
                index,
                catch_type: None,
            } => write!(f, "catch#{index} *"),
        }
    }
}

/// An edge in the control flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEdge {
    src: BlockId,
    target: BlockId,
    kind: CfgEdgeKind,
}

impl CfgEdge {
    pub(crate) fn new(src: BlockId, target: BlockId, kind: CfgEdgeKind) -> Self {
        CfgEdge { src, target, kind }
    }

    /// The block control leaves.
    #[must_use]
    pub const fn src(&self) -> BlockId {
        self.src
    }

    /// The block control enters.
    #[must_use]
    pub const fn target(&self) -> BlockId {
        self.target
    }

    /// The edge semantics.
    #[must_use]
    pub const fn kind(&self) -> &CfgEdgeKind {
        &self.kind
    }

    /// Shorthand for `self.kind().edge_type()`.
    #[must_use]
    pub const fn edge_type(&self) -> EdgeType {
        self.kind.edge_type()
    }

    /// Handler priority of a throw edge.
    #[must_use]
    pub const fn throw_index(&self) -> Option<u32> {
        match self.kind {
            CfgEdgeKind::Throw { index, .. } => Some(index),
            _ => None,
        }
    }

    pub(crate) fn set_src(&mut self, src: BlockId) {
        self.src = src;
    }

    pub(crate) fn set_target(&mut self, target: BlockId) {
        self.target = target;
    }
}

impl fmt::Display for CfgEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.src, self.target, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(CfgEdgeKind::Branch { case_key: None }.is_conditional());
        assert!(!CfgEdgeKind::Branch { case_key: Some(0) }.is_conditional());
        assert!(CfgEdgeKind::Throw {
            index: 0,
            catch_type: None
        }
        .is_exceptional());
        assert_eq!(CfgEdgeKind::Goto.edge_type(), EdgeType::Goto);
    }

    #[test]
    fn display() {
        let edge = CfgEdge::new(
            BlockId(0),
            BlockId(2),
            CfgEdgeKind::Throw {
                index: 1,
                catch_type: Some(TypeRef::new("LE;")),
            },
        );
        assert_eq!(edge.to_string(), "B0 -> B2 (catch#1 LE;)");
        assert_eq!(edge.throw_index(), Some(1));
    }
}
