//! Structured SSA shader IR used by the VPM lowering pass.
//!
//! The IR is deliberately small: a [`Shader`] owns functions made of structured blocks
//! (`if`/`loop` own their child blocks), SSA [`Value`]s of one to four 32-bit components, and
//! function-local scalar variables. New code is produced with a [`Builder`] and spliced in with
//! the batch-edit traversal in [`transform`]. [`verify`] checks structural well-formedness, and
//! [`interp`] executes a lowered shader so the result of a rewrite can be observed directly.

#![forbid(unsafe_code)]

pub mod builder;
mod display;
pub mod interp;
pub mod ir;
pub mod transform;
pub mod verify;

/// Helpers for building shaders in tests.
///
/// Only available for this crate's own tests or with the `test-utils` feature enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::builder::Builder;
pub use crate::interp::{ExecEnv, ExecError, ExecOutcome, StoreEvent};
pub use crate::ir::{
    AluOp, Block, Function, Instr, Local, LocalDecl, Op, Shader, ShaderInfo, Stage, Value,
    ValueInfo, Variable, VaryingSlot, WriteMask,
};
pub use crate::transform::Transform;
pub use crate::verify::{verify_shader, VerifyError};
