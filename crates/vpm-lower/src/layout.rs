//! VPM layout planning.
//!
//! Each vertex record starts with the fixed-function outputs the hardware consumes, allocated in
//! a fixed order, followed by the varying region. A geometry shader's output additionally starts
//! with a header block of one summary word plus one header word per emitted vertex.

use crate::error::LowerIoError;
use crate::key::{GsKey, VsKey};
use crate::limits::MAX_GS_VERTEX_DATA_SIZE;
use crate::slot::UsedOutputs;

/// Word offsets within one vertex record. `None` means the output is not written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpmLayout {
    /// Clip-space position, four words.
    pub pos: Option<u32>,
    /// Viewport-space X and Y as integers, two words.
    pub vp: Option<u32>,
    /// Viewport-space depth.
    pub zs: Option<u32>,
    /// `1 / pos.w`.
    pub rcp_wc: Option<u32>,
    pub psiz: Option<u32>,
    /// Start of the varying region.
    pub varyings: u32,
}

impl VpmLayout {
    /// Allocates the fixed-function block of a stage that feeds the rasterizer.
    pub fn fixed_function(is_coord: bool, per_vertex_point_size: bool) -> Self {
        let mut next = 0;
        let mut alloc = |words: u32| {
            let offset = next;
            next += words;
            Some(offset)
        };

        let pos = if is_coord { None } else { alloc(4) };
        let vp = alloc(2);
        let (zs, rcp_wc) = if is_coord {
            (None, None)
        } else {
            (alloc(1), alloc(1))
        };
        let psiz = if per_vertex_point_size {
            alloc(1)
        } else {
            None
        };

        Self {
            pos,
            vp,
            zs,
            rcp_wc,
            psiz,
            varyings: next,
        }
    }

    /// Words of one vertex record holding `used` varyings.
    pub fn vertex_size(&self, used: &UsedOutputs) -> u32 {
        self.varyings + used.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GsLayout {
    /// Per-vertex template, relative to the start of each vertex's data block.
    pub vertex: VpmLayout,
    pub header_size: u32,
    pub vertex_data_size: u32,
    pub vertices_out: u32,
}

impl GsLayout {
    pub fn output_size(&self) -> u32 {
        self.header_size
            .saturating_add(self.vertex_data_size.saturating_mul(self.vertices_out))
    }
}

/// Vertex-stage layout. A vertex shader that feeds a geometry shader writes only varyings.
pub fn plan_vertex(key: &VsKey) -> VpmLayout {
    if key.is_last_geometry_stage {
        VpmLayout::fixed_function(key.is_coord, key.per_vertex_point_size)
    } else {
        VpmLayout::default()
    }
}

pub fn vertex_output_size(layout: &VpmLayout, used: &UsedOutputs) -> u32 {
    layout.vertex_size(used).max(1)
}

pub fn plan_geometry(key: &GsKey, vertices_out: u32) -> Result<GsLayout, LowerIoError> {
    let vertex = VpmLayout::fixed_function(key.is_coord, key.per_vertex_point_size);
    let vertex_data_size = vertex.vertex_size(&key.used_outputs);
    if vertex_data_size > MAX_GS_VERTEX_DATA_SIZE {
        return Err(LowerIoError::VertexDataTooLarge {
            size: vertex_data_size,
        });
    }

    Ok(GsLayout {
        vertex,
        header_size: 1u32.saturating_add(vertices_out),
        vertex_data_size,
        vertices_out,
    })
}
