//! Error types for the DXIL lowering backend.
//!
//! Recoverable failures travel as `Result<T, CompilerError>`. Internal
//! invariant violations (unknown opcodes in signature lookup, reserved type
//! names redefined, unpaired temporary handle casts) panic with a "BUG:"
//! message instead; there is no safe partial output once those fire.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    /// A call site could not be lowered to a DXIL operation.
    #[error("Lowering error: {0}")]
    Lowering(String),

    /// Module metadata is missing, duplicated, or malformed.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// The target triple does not describe a usable DXIL target.
    #[error("Invalid target: {0}")]
    Triple(String),
}

pub type Result<T> = std::result::Result<T, CompilerError>;

/// Construct a `CompilerError::Lowering` with format args.
#[macro_export]
macro_rules! err_lower {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::Lowering(format!($($arg)*))
    };
}

/// Return early with a `CompilerError::Lowering`.
#[macro_export]
macro_rules! bail_lower {
    ($($arg:tt)*) => {
        return Err($crate::err_lower!($($arg)*))
    };
}

/// Construct a `CompilerError::Metadata` with format args.
#[macro_export]
macro_rules! err_metadata {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::Metadata(format!($($arg)*))
    };
}

/// Return early with a `CompilerError::Metadata`.
#[macro_export]
macro_rules! bail_metadata {
    ($($arg:tt)*) => {
        return Err($crate::err_metadata!($($arg)*))
    };
}

/// Construct a `CompilerError::Triple` with format args.
#[macro_export]
macro_rules! err_triple {
    ($($arg:tt)*) => {
        $crate::error::CompilerError::Triple(format!($($arg)*))
    };
}

/// Return early with a `CompilerError::Triple`.
#[macro_export]
macro_rules! bail_triple {
    ($($arg:tt)*) => {
        return Err($crate::err_triple!($($arg)*))
    };
}
