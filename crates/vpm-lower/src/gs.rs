//! Geometry shader vertex emission.
//!
//! A geometry shader can emit a dynamic number of vertices, so its VPM addresses are tracked in
//! function-local variables at run time:
//!
//! * `output_offset` is the first word of the next vertex's data block,
//! * `header_offset` is the slot of the next vertex's header word,
//! * `header` is the header word the next vertex will be emitted with.
//!
//! `emit_vertex` writes the current vertex and advances both offsets; `end_primitive` resets the
//! header so the next vertex starts a new primitive. At the end of the function the summary word
//! records how many vertices were emitted.

use tracing::trace;
use vpm_ir::{Builder, Function, Local, Transform, Value};

use crate::ff::store_vpm;
use crate::header::{self, LAYER_CLEAR_MASK, LAYER_SHIFT, NEW_PRIMITIVE, VERTEX_COUNT_SHIFT};
use crate::layout::GsLayout;
use crate::lower::LowerState;
use crate::rewrite::replace_with;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GsLocals {
    pub(crate) output_offset: Local,
    pub(crate) header_offset: Local,
    pub(crate) header: Local,
}

impl GsLocals {
    pub(crate) fn declare(func: &mut Function) -> Self {
        Self {
            output_offset: func.add_local("output_offset"),
            header_offset: func.add_local("header_offset"),
            header: func.add_local("header"),
        }
    }
}

/// Emission state of one geometry function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GsEmitter {
    pub(crate) locals: GsLocals,
    pub(crate) layout: GsLayout,
}

impl GsEmitter {
    pub(crate) fn new(func: &mut Function, layout: GsLayout) -> Self {
        Self {
            locals: GsLocals::declare(func),
            layout,
        }
    }

    pub(crate) fn emit_prolog(&self, b: &mut Builder<'_>) {
        let output_offset = b.imm_uint(self.layout.header_size);
        b.store_var(self.locals.output_offset, output_offset);
        let header_offset = b.imm_uint(1);
        b.store_var(self.locals.header_offset, header_offset);
        self.reset_header(b);
    }

    /// Writes the summary word to slot 0.
    pub(crate) fn emit_epilog(&self, b: &mut Builder<'_>) {
        // The first header slot is the summary itself.
        let header_offset = b.load_var(self.locals.header_offset);
        let vertex_count = b.iadd_imm(header_offset, -1);
        let count_bits = b.ishl_imm(vertex_count, VERTEX_COUNT_SHIFT);
        let summary = b.ior_imm(count_bits, self.layout.header_size);
        store_vpm(b, 0, None, summary);
    }

    fn reset_header(&self, b: &mut Builder<'_>) {
        let header = b.imm_uint(header::reset_word(self.layout.vertex_data_size));
        b.store_var(self.locals.header, header);
    }

    /// Packs `layer` into the current header word.
    pub(crate) fn store_layer(&self, b: &mut Builder<'_>, layer: Value) {
        let header = b.load_var(self.locals.header);
        let header = b.iand_imm(header, LAYER_CLEAR_MASK);
        let fb_layers = b.load_fb_layers();
        // Unsigned compare: negative layers are out of range as well.
        let out_of_range = b.uge(layer, fb_layers);
        let zero = b.imm_uint(0);
        let layer_bits = b.ishl_imm(layer, LAYER_SHIFT);
        let layer_bits = b.bcsel(out_of_range, zero, layer_bits);
        let header = b.ior(header, layer_bits);
        b.store_var(self.locals.header, header);
    }
}

impl LowerState<'_> {
    pub(crate) fn lower_emit_vertex(&mut self, func: &mut Function) -> Vec<Transform> {
        let Some(gs) = self.gs else {
            return Vec::new();
        };
        let locals = gs.locals;
        let mut b = Builder::new(func);

        let header = b.load_var(locals.header);
        let header_offset = b.load_var(locals.header_offset);
        let output_offset = b.load_var(locals.output_offset);

        self.emit_ff_outputs(&mut b, Some(output_offset));
        store_vpm(&mut b, 0, Some(header_offset), header);

        let output_offset = b.iadd_imm(output_offset, gs.layout.vertex_data_size as i32);
        let header_offset = b.iadd_imm(header_offset, 1);
        let header = b.iand_imm(header, !NEW_PRIMITIVE);

        b.store_var(locals.output_offset, output_offset);
        b.store_var(locals.header_offset, header_offset);
        b.store_var(locals.header, header);

        trace!(function = %b.function().name, "lowered emit_vertex");
        replace_with(b)
    }

    pub(crate) fn lower_end_primitive(&mut self, func: &mut Function) -> Vec<Transform> {
        let Some(gs) = self.gs else {
            return Vec::new();
        };
        let mut b = Builder::new(func);
        gs.reset_header(&mut b);
        replace_with(b)
    }
}

#[cfg(test)]
mod tests {
    use vpm_ir::{ExecEnv, Shader, Stage};

    use super::*;
    use crate::key::GsKey;
    use crate::layout::plan_geometry;

    #[test]
    fn prolog_and_epilog_without_vertices() {
        let mut shader = Shader::new(Stage::Geometry);
        shader.info.gs_vertices_out = 2;
        let layout = plan_geometry(&GsKey::default(), 2).unwrap();
        let func = &mut shader.functions[0];
        let gs = GsEmitter::new(func, layout);

        let mut b = Builder::new(func);
        gs.emit_prolog(&mut b);
        gs.emit_epilog(&mut b);
        let instrs = b.finish();
        func.body.instrs = instrs;

        let out = vpm_ir::interp::run(&shader, &ExecEnv::default()).unwrap();
        assert_eq!(out.word(0), Some(header::summary_word(0, 3)));
        assert_eq!(out.vpm.len(), 1);
    }

    #[test]
    fn layer_packing_clamps() {
        let layout = plan_geometry(&GsKey::default(), 1).unwrap();
        for (layer, expected) in [(1u32, 1u8), (3, 0), (u32::MAX, 0)] {
            let mut shader = Shader::new(Stage::Geometry);
            let func = &mut shader.functions[0];
            let gs = GsEmitter::new(func, layout);
            let mut b = Builder::new(func);
            gs.emit_prolog(&mut b);
            let layer = b.imm_uint(layer);
            gs.store_layer(&mut b, layer);
            let header = b.load_var(gs.locals.header);
            store_vpm(&mut b, 7, None, header);
            let instrs = b.finish();
            func.body.instrs = instrs;

            let env = ExecEnv {
                fb_layers: 3,
                ..ExecEnv::default()
            };
            let out = vpm_ir::interp::run(&shader, &env).unwrap();
            let word = out.word(7).unwrap();
            assert_eq!(header::VertexHeader::decode(word).layer, expected);
            assert!(header::VertexHeader::decode(word).new_primitive);
        }
    }
}
