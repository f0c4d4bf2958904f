//! VPM output lowering for the V3D shader backend.
//!
//! Vertex and geometry shaders hand their outputs to fixed-function hardware and to the next
//! stage through the VPM, a linear array of 32-bit words. [`lower_io`] rewrites a shader's
//! API-level `store_output` instructions into stores addressed by VPM word, following a layout
//! derived from the per-variant [`CompileContext`]:
//!
//! * the fixed-function block (clip position, viewport XY, depth, `1/w`, point size),
//! * followed by the varyings the consumer actually reads, in its negotiated order.
//!
//! Geometry shaders additionally get a header block and run-time per-vertex addressing. Input
//! and uniform loads of every stage get the small address and swizzle fixups the backend
//! expects.

#![forbid(unsafe_code)]

mod driver_location;
mod error;
mod ff;
mod gs;
pub mod header;
pub mod key;
pub mod layout;
pub mod limits;
mod lower;
mod rewrite;
pub mod slot;

pub use crate::error::LowerIoError;
pub use crate::key::{
    CompileContext, ComputeKey, Environment, FsKey, GsKey, PointSpriteMask, StageKey, VsKey,
};
pub use crate::layout::{GsLayout, VpmLayout};
pub use crate::lower::{lower_io, GsOutputInfo, LowerIoOutput};
pub use crate::slot::{UsedOutputs, VaryingSlotRef};
