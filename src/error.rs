use thiserror::Error;

use crate::ir::LabelId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Structural problems in the input stream (a branch without a target, an unbalanced try
/// marker, code that falls off the end) are reported as errors. Misuse of the mutation API,
/// such as anchoring a change on an instruction that is not in the graph, is a programmer
/// error and panics instead.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - The flat instruction stream is structurally invalid
/// - [`Error::Empty`] - The instruction stream holds no instructions
/// - [`Error::UnboundLabel`] - A branch or handler refers to a label that is never bound
///
/// ## Transformation Errors
/// - [`Error::GraphError`] - A graph operation was asked to work on something that is not there
/// - [`Error::NotAnInvoke`] - The inliner was pointed at an instruction that is not a call
/// - [`Error::Error`] - Anything else
///
/// # Examples
///
/// ```rust
/// use dexflow::{ir::IrCode, ControlFlowGraph, Error};
///
/// match ControlFlowGraph::build(&IrCode::new()) {
///     Err(Error::Empty) => {}
///     other => panic!("unexpected result: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream is damaged and could not be turned into a graph.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    ///
    /// A method body without a single instruction cannot form an entry block.
    #[error("Provided input was empty")]
    Empty,

    /// A label is referenced by a branch or a catch handler but never bound.
    #[error("Label {0} is referenced but never bound")]
    UnboundLabel(LabelId),

    /// A graph operation failed.
    ///
    /// Used when a block, edge or instruction handed to a fallible graph operation does not
    /// exist in the graph it was applied to.
    #[error("{0}")]
    GraphError(String),

    /// The inliner was asked to replace an instruction that is not a method call.
    ///
    /// The associated value is the textual form of the offending instruction.
    #[error("Inline site is not an invoke - {0}")]
    NotAnInvoke(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_macro_records_location() {
        let err = malformed_error!("bad {}", 7);
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad 7");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_messages() {
        assert_eq!(Error::Empty.to_string(), "Provided input was empty");
        assert_eq!(
            Error::UnboundLabel(LabelId::new(3)).to_string(),
            "Label L3 is referenced but never bound"
        );
        assert_eq!(
            Error::NotAnInvoke("const v0 1".into()).to_string(),
            "Inline site is not an invoke - const v0 1"
        );
    }
}
