//! Optimization passes over control flow graphs.
//!
//! Each pass implements [`CfgPass`](crate::compiler::CfgPass) so the
//! [`PassScheduler`](crate::compiler::PassScheduler) can run it across methods.

mod dce;

pub use dce::{DceStats, LocalDce, LocalDcePass};
