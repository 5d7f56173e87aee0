//! Per-call-site diagnostics for the lowering engine.
//!
//! A call site that fails to lower is left in place and recorded here, so a
//! later validation stage can report every offending site in a single
//! compilation instead of stopping at the first.

use crate::ir::ValueId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Name of the function containing the offending call site.
    pub function: String,
    /// The call instruction that could not be lowered.
    pub call: ValueId,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in function '{}': {}", self.function, self.message)
    }
}
