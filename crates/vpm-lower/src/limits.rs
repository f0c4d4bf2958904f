//! Hardware and encoding limits the VPM layout has to respect.

/// Maximum number of scalar varying slots a consumer can negotiate.
///
/// The stored-slot bitset is a `u64`, one bit per entry.
pub const MAX_VARYING_SLOTS: usize = 64;

/// Largest per-vertex data block a geometry header can describe (bits 8–15 of the header word).
pub const MAX_GS_VERTEX_DATA_SIZE: u32 = 0xff;

/// OpenGL uniforms arrive slot-addressed; each slot is a `vec4` of 32-bit words.
pub(crate) const UNIFORM_SLOT_BYTES: u32 = 16;

/// `log2(UNIFORM_SLOT_BYTES)`, applied to dynamic uniform offsets.
pub(crate) const UNIFORM_SLOT_SHIFT: u32 = 4;

/// Number of VPM words per array element of an arrayed varying.
pub(crate) const ARRAY_ELEMENT_SLOTS: u32 = 4;
