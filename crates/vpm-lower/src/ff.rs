//! Fixed-function VPM outputs consumed by clipping, viewport transform and rasterization.

use vpm_ir::{Builder, Value, WriteMask};

use crate::lower::LowerState;

/// Stores `value` at VPM word `base`, relative to `cursor` when one is given.
///
/// With a cursor the word address is computed into the offset operand so immediate folding can
/// merge it with the cursor arithmetic.
pub(crate) fn store_vpm(b: &mut Builder<'_>, base: u32, cursor: Option<Value>, value: Value) {
    let (offset, base) = match cursor {
        Some(cursor) => (b.iadd_imm(cursor, base as i32), 0),
        None => (b.imm_uint(0), base),
    };
    b.store_output(value, offset, base, 0, WriteMask::X, None);
}

impl LowerState<'_> {
    /// Captured position component `i`, or a fresh undef if no store wrote it.
    ///
    /// Geometry functions seed all four components in the prolog, so the fallback only fires in
    /// the vertex tail.
    fn position(&mut self, b: &mut Builder<'_>, i: usize) -> Value {
        *self.pos[i].get_or_insert_with(|| b.undef(1))
    }

    /// Emits the fixed-function block of one vertex and zero-fills every varying slot that no
    /// store has written.
    pub(crate) fn emit_ff_outputs(&mut self, b: &mut Builder<'_>, cursor: Option<Value>) {
        let Some(target) = self.target else {
            return;
        };
        let layout = target.layout;
        let pos = [0, 1, 2, 3].map(|i| self.position(b, i));

        let rcp_wc = b.frcp(pos[3]);

        if let Some(offset) = layout.pos {
            for (i, &chan) in (0..).zip(pos.iter()) {
                store_vpm(b, offset + i, cursor, chan);
            }
        }

        if let Some(offset) = layout.vp {
            for i in 0..2 {
                let scale = if i == 0 {
                    b.load_viewport_x_scale()
                } else {
                    b.load_viewport_y_scale()
                };
                let scaled = b.fmul(pos[i as usize], scale);
                let projected = b.fmul(scaled, rcp_wc);
                // Round down before the integer conversion so the hardware does not round twice.
                let floored = b.ffloor(projected);
                let fixed = b.f2i32(floored);
                store_vpm(b, offset + i, cursor, fixed);
            }
        }

        if let Some(offset) = layout.zs {
            let z_scale = b.load_viewport_z_scale();
            let z = b.fmul(pos[2], z_scale);
            let z = b.fmul(z, rcp_wc);
            let z_offset = b.load_viewport_z_offset();
            let z = b.fadd(z, z_offset);
            store_vpm(b, offset, cursor, z);
        }

        if let Some(offset) = layout.rcp_wc {
            store_vpm(b, offset, cursor, rcp_wc);
        }

        for slot in self.varyings_stored.missing(target.used.len()) {
            let zero = b.imm_uint(0);
            store_vpm(b, layout.varyings + slot, cursor, zero);
        }
    }
}
