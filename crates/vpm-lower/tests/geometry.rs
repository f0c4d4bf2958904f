use pretty_assertions::assert_eq;
use vpm_ir::interp::{self, ExecEnv, ExecOutcome};
use vpm_ir::test_utils::{append_main, declare_output, geometry_shader, store_varying, vec4f};
use vpm_ir::{verify_shader, Builder, Op, Shader, VaryingSlot};
use vpm_lower::header::{
    pack_layer, reset_word, summary_word, OutputSummary, VertexHeader, NEW_PRIMITIVE,
};
use vpm_lower::{lower_io, CompileContext, GsKey, GsOutputInfo, UsedOutputs, VaryingSlotRef};

fn lower_and_run(shader: &mut Shader, key: GsKey, env: &ExecEnv) -> ExecOutcome {
    lower_io(shader, &CompileContext::geometry(key)).expect("lowering failed");
    verify_shader(shader).expect("lowered shader is malformed");
    interp::run(shader, env).expect("lowered shader failed to execute")
}

fn coord_key(used: Vec<VaryingSlotRef>) -> GsKey {
    GsKey {
        is_coord: true,
        used_outputs: UsedOutputs::new(used).unwrap(),
        ..GsKey::default()
    }
}

fn var0_xy() -> Vec<VaryingSlotRef> {
    vec![
        VaryingSlotRef::new(VaryingSlot::var(0), 0),
        VaryingSlotRef::new(VaryingSlot::var(0), 1),
    ]
}

/// Stores a position with `x` as its X coordinate and `(a, a + 1)` to `var0.xy`.
fn write_vertex(b: &mut Builder<'_>, x: f32, a: f32) {
    let pos = vec4f(b, [x, 0.0, 0.0, 1.0]);
    store_varying(b, pos, VaryingSlot::POS, 0);
    let lo = b.imm_float(a);
    let hi = b.imm_float(a + 1.0);
    let v = b.vec(&[lo, hi]);
    store_varying(b, v, VaryingSlot::var(0), 0);
}

#[test]
fn triangle_strip_layout() {
    let mut gs = geometry_shader(3);
    declare_output(&mut gs, "v", VaryingSlot::var(0), 0);
    append_main(&mut gs, |b| {
        for k in 0..3 {
            write_vertex(b, k as f32, 10.0 * k as f32);
            b.emit_vertex();
        }
        b.end_primitive();
    });

    let out = lower_io(&mut gs, &CompileContext::geometry(coord_key(var0_xy()))).unwrap();
    assert_eq!(
        out.gs,
        Some(GsOutputInfo {
            header_size: 4,
            vertex_data_size: 4,
        })
    );
    assert_eq!(out.vpm_output_size, 16);
    verify_shader(&gs).unwrap();
    assert!(!gs.functions[0]
        .body
        .instrs
        .iter()
        .any(|i| matches!(i.op, Op::EmitVertex | Op::EndPrimitive)));

    let run = interp::run(&gs, &ExecEnv::default()).unwrap();
    assert_eq!(run.word(0), Some(summary_word(3, 4)));
    assert_eq!(
        OutputSummary::decode(run.word(0).unwrap()),
        OutputSummary {
            vertex_count: 3,
            header_size: 4,
        }
    );

    let headers: Vec<u32> = (1..4).map(|slot| run.word(slot).unwrap()).collect();
    assert_eq!(headers, vec![0x0401, 0x0400, 0x0400]);

    for k in 0..3u32 {
        let base = 4 + 4 * k;
        assert_eq!(run.int(base), Some(k as i32), "vp.x of vertex {k}");
        assert_eq!(run.int(base + 1), Some(0), "vp.y of vertex {k}");
        assert_eq!(run.float(base + 2), Some(10.0 * k as f32));
        assert_eq!(run.float(base + 3), Some(10.0 * k as f32 + 1.0));
    }
    assert_eq!(run.vpm.len(), 16);

    assert_eq!(gs.outputs[0].driver_location, 2);
}

#[test]
fn end_primitive_restarts_the_strip() {
    let mut gs = geometry_shader(3);
    append_main(&mut gs, |b| {
        write_vertex(b, 0.0, 0.0);
        b.emit_vertex();
        write_vertex(b, 1.0, 1.0);
        b.emit_vertex();
        b.end_primitive();
        write_vertex(b, 2.0, 2.0);
        b.emit_vertex();
    });

    let run = lower_and_run(&mut gs, coord_key(var0_xy()), &ExecEnv::default());
    let headers: Vec<bool> = (1..4)
        .map(|slot| VertexHeader::decode(run.word(slot).unwrap()).new_primitive)
        .collect();
    assert_eq!(headers, vec![true, false, true]);
}

#[test]
fn layer_is_packed_and_clamped() {
    let mut gs = geometry_shader(2);
    append_main(&mut gs, |b| {
        let layer = b.imm_int(2);
        store_varying(b, layer, VaryingSlot::LAYER, 0);
        write_vertex(b, 0.0, 0.0);
        b.emit_vertex();

        let layer = b.imm_int(7);
        store_varying(b, layer, VaryingSlot::LAYER, 0);
        write_vertex(b, 0.0, 0.0);
        b.emit_vertex();
    });

    let env = ExecEnv {
        fb_layers: 4,
        ..ExecEnv::default()
    };
    let run = lower_and_run(&mut gs, coord_key(var0_xy()), &env);
    let first = pack_layer(reset_word(4), 2, env.fb_layers);
    let second = pack_layer(first & !NEW_PRIMITIVE, 7, env.fb_layers);
    assert_eq!(run.word(1), Some(first));
    assert_eq!(run.word(2), Some(second));
    assert_eq!(
        VertexHeader::decode(second),
        VertexHeader {
            new_primitive: false,
            vertex_data_size: 4,
            layer: 0,
        }
    );
}

#[test]
fn negative_layer_is_clamped() {
    let mut gs = geometry_shader(1);
    append_main(&mut gs, |b| {
        let layer = b.imm_int(-1);
        store_varying(b, layer, VaryingSlot::LAYER, 0);
        write_vertex(b, 0.0, 0.0);
        b.emit_vertex();
    });

    let env = ExecEnv {
        fb_layers: 8,
        ..ExecEnv::default()
    };
    let run = lower_and_run(&mut gs, coord_key(var0_xy()), &env);
    let expected = pack_layer(reset_word(4), -1i32 as u32, env.fb_layers);
    assert_eq!(run.word(1), Some(expected));
    assert_eq!(VertexHeader::decode(expected).layer, 0);
}

#[test]
fn vertices_emitted_from_a_loop() {
    let mut gs = geometry_shader(4);
    append_main(&mut gs, |b| {
        let counter = b.add_local("i");
        let zero = b.imm_uint(0);
        b.store_var(counter, zero);
        let limit = b.imm_uint(3);
        b.push_loop(|b| {
            let i = b.load_var(counter);
            let done = b.ige(i, limit);
            b.push_if(done, |b| b.push_break(), |_| {});

            let x = b.i2f32(i);
            let zero = b.imm_float(0.0);
            let one = b.imm_float(1.0);
            let pos = b.vec(&[x, zero, zero, one]);
            store_varying(b, pos, VaryingSlot::POS, 0);
            store_varying(b, x, VaryingSlot::var(0), 0);
            b.emit_vertex();

            let next = b.iadd_imm(i, 1);
            b.store_var(counter, next);
        });
    });

    let key = coord_key(vec![VaryingSlotRef::new(VaryingSlot::var(0), 0)]);
    let run = lower_and_run(&mut gs, key, &ExecEnv::default());

    // Three of the four declared vertices were emitted.
    let summary = OutputSummary::decode(run.word(0).unwrap());
    assert_eq!(summary.vertex_count, 3);
    assert_eq!(summary.header_size, 5);

    for k in 0..3u32 {
        let base = 5 + 3 * k;
        assert_eq!(run.int(base), Some(k as i32));
        assert_eq!(run.float(base + 2), Some(k as f32));
    }
    assert_eq!(run.word(4), None, "fourth header slot is never written");
}

#[test]
fn vertices_emitted_from_either_branch_without_position() {
    let mut gs = geometry_shader(2);
    append_main(&mut gs, |b| {
        let cond = b.load_fb_layers();
        b.push_if(
            cond,
            |b| {
                let a = b.imm_float(1.0);
                store_varying(b, a, VaryingSlot::var(0), 0);
                b.emit_vertex();
            },
            |b| {
                let a = b.imm_float(2.0);
                store_varying(b, a, VaryingSlot::var(0), 0);
                b.emit_vertex();
            },
        );
    });

    let key = coord_key(vec![VaryingSlotRef::new(VaryingSlot::var(0), 0)]);
    lower_io(&mut gs, &CompileContext::geometry(key)).unwrap();
    verify_shader(&gs).unwrap();

    // header_size 3, vertex data 3: vp.xy, var0.x.
    for (fb_layers, expected) in [(0, 2.0), (1, 1.0)] {
        let env = ExecEnv {
            fb_layers,
            ..ExecEnv::default()
        };
        let run = interp::run(&gs, &env).unwrap();
        assert_eq!(run.word(0), Some(summary_word(1, 3)));
        assert_eq!(run.float(5), Some(expected), "fb_layers = {fb_layers}");
    }
}

#[test]
fn unwritten_varyings_are_zeroed_per_vertex() {
    let mut gs = geometry_shader(2);
    append_main(&mut gs, |b| {
        for _ in 0..2 {
            let pos = vec4f(b, [0.0, 0.0, 0.0, 1.0]);
            store_varying(b, pos, VaryingSlot::POS, 0);
            let a = b.imm_float(3.0);
            store_varying(b, a, VaryingSlot::var(0), 0);
            b.emit_vertex();
        }
    });

    let key = coord_key(vec![
        VaryingSlotRef::new(VaryingSlot::var(0), 0),
        VaryingSlotRef::new(VaryingSlot::var(1), 0),
    ]);
    let run = lower_and_run(&mut gs, key, &ExecEnv::default());

    // header_size 3, vertex data 4: vp.xy, var0.x, var1.x.
    for base in [3, 7] {
        assert_eq!(run.float(base + 2), Some(3.0));
        assert_eq!(run.word(base + 3), Some(0));
    }
}

#[test]
fn full_variant_geometry_writes_position_and_point_size() {
    let mut gs = geometry_shader(1);
    append_main(&mut gs, |b| {
        let pos = vec4f(b, [4.0, 2.0, 1.0, 2.0]);
        store_varying(b, pos, VaryingSlot::POS, 0);
        let size = b.imm_float(5.0);
        store_varying(b, size, VaryingSlot::PSIZ, 0);
        b.emit_vertex();
    });

    let key = GsKey {
        per_vertex_point_size: true,
        ..GsKey::default()
    };
    let env = ExecEnv {
        viewport_x_scale: 2.0,
        viewport_y_scale: 2.0,
        viewport_z_scale: 1.0,
        viewport_z_offset: 0.5,
        ..ExecEnv::default()
    };
    let run = lower_and_run(&mut gs, key, &env);

    // Header block of 2, then pos(4) vp(2) zs rcp_wc psiz.
    let data: Vec<u32> = (2..11).map(|slot| run.word(slot).unwrap()).collect();
    assert_eq!(
        data,
        vec![
            4.0f32.to_bits(),
            2.0f32.to_bits(),
            1.0f32.to_bits(),
            2.0f32.to_bits(),
            4,
            2,
            1.0f32.to_bits(),
            0.5f32.to_bits(),
            5.0f32.to_bits(),
        ]
    );
    assert_eq!(VertexHeader::decode(run.word(1).unwrap()).vertex_data_size, 9);
}
