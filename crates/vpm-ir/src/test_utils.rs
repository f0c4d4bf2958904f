use crate::builder::Builder;
use crate::ir::{Shader, Stage, Value, Variable, VaryingSlot, WriteMask};

/// Creates an empty shader with a single `main` function.
pub fn shader(stage: Stage) -> Shader {
    Shader::new(stage)
}

/// Creates an empty geometry shader declaring `vertices_out` as its maximum vertex count.
pub fn geometry_shader(vertices_out: u32) -> Shader {
    let mut shader = Shader::new(Stage::Geometry);
    shader.info.gs_vertices_out = vertices_out;
    shader
}

/// Declares an output variable and returns its driver location.
///
/// Driver locations are assigned in declaration order.
pub fn declare_output(
    shader: &mut Shader,
    name: &str,
    location: VaryingSlot,
    location_frac: u8,
) -> u32 {
    let driver_location = shader.outputs.len() as u32;
    shader
        .outputs
        .push(Variable::new(name, location, driver_location).with_location_frac(location_frac));
    driver_location
}

/// Declares an input variable and returns its driver location.
pub fn declare_input(
    shader: &mut Shader,
    name: &str,
    location: VaryingSlot,
    location_frac: u8,
) -> u32 {
    let driver_location = shader.inputs.len() as u32;
    shader
        .inputs
        .push(Variable::new(name, location, driver_location).with_location_frac(location_frac));
    driver_location
}

/// Appends instructions produced by `build` to the end of the entry function.
pub fn append_main<R>(shader: &mut Shader, build: impl FnOnce(&mut Builder<'_>) -> R) -> R {
    let func = shader
        .entry_point_mut()
        .expect("test shader has no entry point");
    let mut b = Builder::new(func);
    let out = build(&mut b);
    let instrs = b.finish();
    func.body.instrs.extend(instrs);
    out
}

/// Emits an API-level `store_output` of every component of `src`, starting at `component`.
pub fn store_varying(b: &mut Builder<'_>, src: Value, location: VaryingSlot, component: u8) {
    let num_components = b.function().num_components(src);
    let zero = b.imm_uint(0);
    b.store_output(
        src,
        zero,
        0,
        component,
        WriteMask::for_components(num_components),
        Some(location),
    );
}

/// Builds a `vec4` of float immediates.
pub fn vec4f(b: &mut Builder<'_>, values: [f32; 4]) -> Value {
    let comps: Vec<Value> = values.iter().map(|&v| b.imm_float(v)).collect();
    b.vec(&comps)
}
