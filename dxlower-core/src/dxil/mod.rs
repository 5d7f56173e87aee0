//! DXIL backend: the operation catalog, the op builder, and the pass that
//! lowers generic intrinsics to `dx.op.*` calls.

pub mod builder;
pub mod lowering;
pub mod ops;

#[cfg(test)]
mod lowering_tests;

pub use builder::OpBuilder;
pub use lowering::{HandlePath, LowerResult, OpLowerer};
pub use ops::OpCode;
