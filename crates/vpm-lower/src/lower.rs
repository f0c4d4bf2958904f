//! Entry point of the VPM output lowering.

use tracing::debug;
use vpm_ir::transform::{append_to_function, for_each_instruction, prepend_to_function};
use vpm_ir::{verify_shader, Builder, Function, Shader, Stage, Value, Variable};

use crate::driver_location::update_output_driver_locations;
use crate::error::LowerIoError;
use crate::gs::GsEmitter;
use crate::key::{CompileContext, StageKey};
use crate::layout::{plan_geometry, plan_vertex, vertex_output_size, GsLayout, VpmLayout};
use crate::slot::{UsedOutputs, VaryingsStored};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GsOutputInfo {
    pub header_size: u32,
    pub vertex_data_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LowerIoOutput {
    /// Always set: the pass unconditionally rewrites declarations and layout metadata.
    pub progress: bool,
    /// Words of VPM output one invocation writes; 0 for stages without VPM output.
    pub vpm_output_size: u32,
    pub gs: Option<GsOutputInfo>,
}

/// Vertex record layout plus the slot table it was planned for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VpmTarget<'k> {
    pub(crate) layout: VpmLayout,
    pub(crate) used: &'k UsedOutputs,
}

#[derive(Debug, Clone, Copy)]
struct Plan<'k> {
    target: Option<VpmTarget<'k>>,
    gs: Option<GsLayout>,
    vpm_output_size: u32,
}

impl<'k> Plan<'k> {
    fn new(key: &'k StageKey, gs_vertices_out: u32) -> Result<Self, LowerIoError> {
        Ok(match key {
            StageKey::Vertex(key) => {
                let layout = plan_vertex(key);
                Self {
                    target: Some(VpmTarget {
                        layout,
                        used: &key.used_outputs,
                    }),
                    gs: None,
                    vpm_output_size: vertex_output_size(&layout, &key.used_outputs),
                }
            }
            StageKey::Geometry(key) => {
                let layout = plan_geometry(key, gs_vertices_out)?;
                Self {
                    target: Some(VpmTarget {
                        layout: layout.vertex,
                        used: &key.used_outputs,
                    }),
                    gs: Some(layout),
                    vpm_output_size: layout.output_size(),
                }
            }
            StageKey::Fragment(_) | StageKey::Compute(_) => Self {
                target: None,
                gs: None,
                vpm_output_size: 0,
            },
        })
    }
}

/// Per-function rewrite state.
pub(crate) struct LowerState<'a> {
    pub(crate) key: &'a StageKey,
    /// Input declarations, for looking up a load's variable by driver location.
    pub(crate) inputs: &'a [Variable],
    pub(crate) target: Option<VpmTarget<'a>>,
    pub(crate) gs: Option<GsEmitter>,
    pub(crate) varyings_stored: VaryingsStored,
    /// Last value stored to each position component.
    pub(crate) pos: [Option<Value>; 4],
}

impl<'a> LowerState<'a> {
    fn new(key: &'a StageKey, inputs: &'a [Variable], target: Option<VpmTarget<'a>>) -> Self {
        Self {
            key,
            inputs,
            target,
            gs: None,
            varyings_stored: VaryingsStored::default(),
            pos: [None; 4],
        }
    }

    fn lower_function(&mut self, func: &mut Function, gs_layout: Option<GsLayout>) {
        self.gs = gs_layout.map(|layout| GsEmitter::new(func, layout));
        let prolog = match self.gs {
            Some(gs) => {
                let mut b = Builder::new(func);
                gs.emit_prolog(&mut b);
                // Every emit_vertex reads these, whichever branch it sits in.
                self.pos = [0, 1, 2, 3].map(|_| Some(b.undef(1)));
                Some(b.finish())
            }
            None => None,
        };

        for_each_instruction(func, |func, instr| self.rewrite_instr(func, instr));

        let mut b = Builder::new(func);
        match self.gs {
            Some(gs) => gs.emit_epilog(&mut b),
            None if self.target.is_some() => self.emit_ff_outputs(&mut b, None),
            None => {}
        }
        let epilog = b.finish();

        if let Some(prolog) = prolog {
            prepend_to_function(func, prolog);
        }
        append_to_function(func, epilog);
    }
}

/// Rewrites `shader`'s outputs to VPM addressing for the variant described by `ctx`.
///
/// Vertex and geometry stores are relocated to their VPM words and the fixed-function outputs
/// are synthesized; fragment and compute shaders only get their input and uniform loads fixed
/// up. Output declarations nothing reads are removed.
pub fn lower_io(
    shader: &mut Shader,
    ctx: &CompileContext,
) -> Result<LowerIoOutput, LowerIoError> {
    let stage = shader.stage();
    if matches!(stage, Stage::TessControl | Stage::TessEval) {
        return Err(LowerIoError::UnsupportedStage(stage));
    }
    if ctx.key.stage() != stage {
        return Err(LowerIoError::KeyStageMismatch {
            key: ctx.key.stage(),
            shader: stage,
        });
    }
    verify_shader(shader)?;

    let plan = Plan::new(&ctx.key, shader.info.gs_vertices_out)?;
    if let Some(target) = &plan.target {
        debug!(
            %stage,
            layout = ?target.layout,
            used_outputs = target.used.len(),
            vpm_output_size = plan.vpm_output_size,
            "planned VPM layout"
        );
    }

    let Shader {
        inputs,
        outputs,
        functions,
        ..
    } = shader;
    for func in functions.iter_mut() {
        let mut state = LowerState::new(&ctx.key, inputs, plan.target);
        state.lower_function(func, plan.gs);
    }

    if let Some(target) = &plan.target {
        update_output_driver_locations(outputs, target);
    }

    let output = LowerIoOutput {
        progress: true,
        vpm_output_size: plan.vpm_output_size,
        gs: plan.gs.map(|layout| GsOutputInfo {
            header_size: layout.header_size,
            vertex_data_size: layout.vertex_data_size,
        }),
    };
    debug!(%stage, ?output, "lowered shader I/O");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{FsKey, GsKey, VsKey};

    #[test]
    fn rejects_tessellation() {
        for stage in [Stage::TessControl, Stage::TessEval] {
            let mut shader = Shader::new(stage);
            let ctx = CompileContext::vertex(VsKey::default());
            assert_eq!(
                lower_io(&mut shader, &ctx),
                Err(LowerIoError::UnsupportedStage(stage))
            );
        }
    }

    #[test]
    fn rejects_mismatched_key() {
        let mut shader = Shader::new(Stage::Vertex);
        let ctx = CompileContext::geometry(GsKey::default());
        assert_eq!(
            lower_io(&mut shader, &ctx),
            Err(LowerIoError::KeyStageMismatch {
                key: Stage::Geometry,
                shader: Stage::Vertex,
            })
        );
    }

    #[test]
    fn fragment_reports_no_vpm_output() {
        let mut shader = Shader::new(Stage::Fragment);
        let out = lower_io(&mut shader, &CompileContext::fragment(FsKey::default())).unwrap();
        assert_eq!(
            out,
            LowerIoOutput {
                progress: true,
                vpm_output_size: 0,
                gs: None,
            }
        );
        assert_eq!(shader.functions[0].instruction_count(), 0);
    }

    #[test]
    fn geometry_reports_header_info() {
        let mut shader = Shader::new(Stage::Geometry);
        shader.info.gs_vertices_out = 3;
        let key = GsKey {
            is_coord: true,
            used_outputs: UsedOutputs::from_locations(&[]).unwrap(),
            ..GsKey::default()
        };
        let out = lower_io(&mut shader, &CompileContext::geometry(key)).unwrap();
        assert_eq!(
            out.gs,
            Some(GsOutputInfo {
                header_size: 4,
                vertex_data_size: 2,
            })
        );
        assert_eq!(out.vpm_output_size, 10);
        assert_eq!(shader.functions[0].locals.len(), 3);
    }
}
