//! Small shared building blocks: the liveness bit vector and DOT rendering helpers.

mod bitset;
mod dot;

pub use bitset::BitSet;
pub use dot::escape_dot;
pub(crate) use dot::DotWriter;
