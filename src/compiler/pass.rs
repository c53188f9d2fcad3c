//! The pass interface shared by all graph transformations.

use crate::{
    analysis::ControlFlowGraph,
    compiler::EventLog,
    ir::{IrCode, MethodRef},
    Result,
};

/// A method under optimization: its identity and its graph.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// The method's reference.
    pub method: MethodRef,
    /// The method's control flow graph, edited in place by the passes.
    pub cfg: ControlFlowGraph,
}

impl MethodBody {
    /// Pairs `method` with an already built graph.
    #[must_use]
    pub fn new(method: MethodRef, cfg: ControlFlowGraph) -> Self {
        Self { method, cfg }
    }

    /// Builds the graph of `code` for `method`.
    ///
    /// # Errors
    ///
    /// Returns the error of [`ControlFlowGraph::build`] if `code` is malformed.
    pub fn from_code(method: MethodRef, code: &IrCode) -> Result<Self> {
        Ok(Self {
            method,
            cfg: ControlFlowGraph::build(code)?,
        })
    }
}

/// A transformation over one method's graph.
///
/// Passes must be thread-safe (`Send + Sync`): the scheduler runs the same pass on many
/// methods at once, each worker holding exclusive access to one [`MethodBody`].
pub trait CfgPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// One-line summary of what the pass does.
    fn description(&self) -> &'static str {
        ""
    }

    /// Should this pass run on a specific method?
    fn should_run(&self, _body: &MethodBody) -> bool {
        true
    }

    /// Runs the pass on one method.
    ///
    /// Returns `true` if anything changed. Each change is recorded in `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot process the method.
    fn run_on_method(&self, body: &mut MethodBody, events: &EventLog) -> Result<bool>;
}
