//! Per-variant compile keys.
//!
//! A key captures the draw-time state that changes how a shader is lowered. Keys are plain data:
//! the pass only ever borrows them, so one key can be shared by concurrent compile jobs.

use bitflags::bitflags;
use vpm_ir::{Stage, VaryingSlot};

use crate::slot::UsedOutputs;

/// API flavor the shader was compiled for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Environment {
    /// Uniform offsets are in `vec4` slots and point coordinates need no origin fixup.
    #[default]
    OpenGl,
    /// Uniform offsets are already in bytes and point coordinates are fixed up here.
    Vulkan,
}

bitflags! {
    /// Texture coordinate sets replaced by the point sprite coordinate.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct PointSpriteMask: u8 {
        const TEX0 = 1 << 0;
        const TEX1 = 1 << 1;
        const TEX2 = 1 << 2;
        const TEX3 = 1 << 3;
        const TEX4 = 1 << 4;
        const TEX5 = 1 << 5;
        const TEX6 = 1 << 6;
        const TEX7 = 1 << 7;
    }
}

impl PointSpriteMask {
    /// Whether `location` reads the point coordinate under this mask.
    pub fn replaces(self, location: VaryingSlot) -> bool {
        if location == VaryingSlot::PNTC {
            return true;
        }
        location
            .tex_index()
            .is_some_and(|n| self.bits() & (1 << n) != 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VsKey {
    pub environment: Environment,
    /// The vertex shader feeds the rasterizer directly (no geometry stage follows).
    pub is_last_geometry_stage: bool,
    /// Binning-pass variant: only the coordinates needed for tiling are written.
    pub is_coord: bool,
    pub per_vertex_point_size: bool,
    pub used_outputs: UsedOutputs,
    /// Bit `n` set swaps the R and B channels of vertex attribute `n`.
    pub va_swap_rb_mask: u32,
}

impl VsKey {
    pub fn swaps_rb(&self, location: VaryingSlot) -> bool {
        1u32.checked_shl(location.0)
            .is_some_and(|bit| self.va_swap_rb_mask & bit != 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GsKey {
    pub environment: Environment,
    pub is_coord: bool,
    pub per_vertex_point_size: bool,
    pub used_outputs: UsedOutputs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FsKey {
    pub environment: Environment,
    pub point_sprite_mask: PointSpriteMask,
    /// The draw rasterizes points, so point coordinates are meaningful.
    pub is_points: bool,
    pub point_coord_upper_left: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComputeKey {
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StageKey {
    Vertex(VsKey),
    Geometry(GsKey),
    Fragment(FsKey),
    Compute(ComputeKey),
}

impl StageKey {
    pub fn stage(&self) -> Stage {
        match self {
            StageKey::Vertex(_) => Stage::Vertex,
            StageKey::Geometry(_) => Stage::Geometry,
            StageKey::Fragment(_) => Stage::Fragment,
            StageKey::Compute(_) => Stage::Compute,
        }
    }

    pub fn environment(&self) -> Environment {
        match self {
            StageKey::Vertex(key) => key.environment,
            StageKey::Geometry(key) => key.environment,
            StageKey::Fragment(key) => key.environment,
            StageKey::Compute(key) => key.environment,
        }
    }
}

/// Compile-job state visible to the pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompileContext {
    pub key: StageKey,
}

impl CompileContext {
    pub fn new(key: StageKey) -> Self {
        Self { key }
    }

    pub fn vertex(key: VsKey) -> Self {
        Self::new(StageKey::Vertex(key))
    }

    pub fn geometry(key: GsKey) -> Self {
        Self::new(StageKey::Geometry(key))
    }

    pub fn fragment(key: FsKey) -> Self {
        Self::new(StageKey::Fragment(key))
    }

    pub fn compute(key: ComputeKey) -> Self {
        Self::new(StageKey::Compute(key))
    }
}
