//! Geometry output header words.
//!
//! Per-vertex header word:
//!
//! | bits  | field                                  |
//! |-------|----------------------------------------|
//! | 0     | vertex starts a new primitive          |
//! | 8–15  | vertex data length in words            |
//! | 16–23 | layer                                  |
//!
//! Slot 0 of the geometry output holds the summary word: the header block size in the low bits
//! and the number of emitted vertices from bit 16 up.

pub const NEW_PRIMITIVE: u32 = 1 << 0;
pub const VERTEX_DATA_SHIFT: u32 = 8;
pub const LAYER_SHIFT: u32 = 16;
/// Clears the layer field and keeps everything else.
pub const LAYER_CLEAR_MASK: u32 = 0xff00_ffff;
pub const VERTEX_COUNT_SHIFT: u32 = 16;

/// Header of the first vertex of a primitive.
pub fn reset_word(vertex_data_size: u32) -> u32 {
    NEW_PRIMITIVE | (vertex_data_size << VERTEX_DATA_SHIFT)
}

/// Replaces the layer field of `header`. Layers outside the framebuffer select layer 0.
pub fn pack_layer(header: u32, layer: u32, fb_layers: u32) -> u32 {
    let layer = if layer >= fb_layers { 0 } else { layer };
    (header & LAYER_CLEAR_MASK) | (layer << LAYER_SHIFT)
}

pub fn summary_word(vertex_count: u32, header_size: u32) -> u32 {
    (vertex_count << VERTEX_COUNT_SHIFT) | header_size
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexHeader {
    pub new_primitive: bool,
    pub vertex_data_size: u8,
    pub layer: u8,
}

impl VertexHeader {
    pub fn decode(word: u32) -> Self {
        Self {
            new_primitive: word & NEW_PRIMITIVE != 0,
            vertex_data_size: (word >> VERTEX_DATA_SHIFT) as u8,
            layer: (word >> LAYER_SHIFT) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSummary {
    pub vertex_count: u32,
    pub header_size: u32,
}

impl OutputSummary {
    pub fn decode(word: u32) -> Self {
        Self {
            vertex_count: word >> VERTEX_COUNT_SHIFT,
            header_size: word & ((1 << VERTEX_COUNT_SHIFT) - 1),
        }
    }
}
