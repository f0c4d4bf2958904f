//! Reference interpreter for lowered shaders.
//!
//! Executes the entry function of a [`Shader`] once against an [`ExecEnv`] and records every
//! `store_output` as a write to a linear VPM addressed by `base + offset`. Geometry emission
//! intrinsics are rejected: they only exist before VPM lowering.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::ir::{AluOp, Block, Function, Local, Op, Shader, Value, VaryingSlot};

#[derive(Debug, Clone)]
pub struct ExecEnv {
    /// Input words keyed by `(location, component)`.
    pub inputs: HashMap<(VaryingSlot, u8), u32>,
    /// Uniform storage, addressed in bytes by `load_uniform`.
    pub uniforms: Vec<u32>,
    pub viewport_x_scale: f32,
    pub viewport_y_scale: f32,
    pub viewport_z_scale: f32,
    pub viewport_z_offset: f32,
    pub fb_layers: u32,
    /// Upper bound on executed loop iterations across the whole run.
    pub max_loop_iterations: u32,
}

impl Default for ExecEnv {
    fn default() -> Self {
        Self {
            inputs: HashMap::new(),
            uniforms: Vec::new(),
            viewport_x_scale: 1.0,
            viewport_y_scale: 1.0,
            viewport_z_scale: 1.0,
            viewport_z_offset: 0.0,
            fb_layers: 1,
            max_loop_iterations: 4096,
        }
    }
}

impl ExecEnv {
    pub fn with_input(mut self, location: VaryingSlot, component: u8, bits: u32) -> Self {
        self.inputs.insert((location, component), bits);
        self
    }

    pub fn with_input_f32(self, location: VaryingSlot, component: u8, value: f32) -> Self {
        self.with_input(location, component, value.to_bits())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub slot: u32,
    pub bits: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Final contents of every written VPM slot.
    pub vpm: BTreeMap<u32, u32>,
    /// Every store in execution order, including overwritten ones.
    pub stores: Vec<StoreEvent>,
}

impl ExecOutcome {
    pub fn word(&self, slot: u32) -> Option<u32> {
        self.vpm.get(&slot).copied()
    }

    pub fn float(&self, slot: u32) -> Option<f32> {
        self.word(slot).map(f32::from_bits)
    }

    pub fn int(&self, slot: u32) -> Option<i32> {
        self.word(slot).map(|w| w as i32)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("shader has no entry point")]
    NoEntryPoint,
    #[error("{0} is read before it is defined")]
    UndefinedValue(Value),
    #[error("local {0} is read before it is written")]
    UninitializedLocal(Local),
    #[error("{0} must be lowered before execution")]
    UnloweredIntrinsic(&'static str),
    #[error("input {location}.{component} is not bound")]
    UnboundInput { location: VaryingSlot, component: u8 },
    #[error("uniform byte address {addr} is out of bounds")]
    UniformOutOfBounds { addr: u32 },
    #[error("store_output of {0} is not scalar")]
    NonScalarStore(Value),
    #[error("component {component} is out of range for {value}")]
    ComponentOutOfRange { value: Value, component: u8 },
    #[error("loop iteration limit of {0} exceeded")]
    LoopLimit(u32),
}

type Components = [u32; 4];

enum Flow {
    Normal,
    Break,
}

struct Machine<'a> {
    env: &'a ExecEnv,
    func: &'a Function,
    values: Vec<Option<Components>>,
    locals: Vec<Option<u32>>,
    outcome: ExecOutcome,
    loop_iterations: u32,
}

pub fn run(shader: &Shader, env: &ExecEnv) -> Result<ExecOutcome, ExecError> {
    let func = shader.entry_point().ok_or(ExecError::NoEntryPoint)?;
    let mut machine = Machine {
        env,
        func,
        values: vec![None; func.values.len()],
        locals: vec![None; func.locals.len()],
        outcome: ExecOutcome::default(),
        loop_iterations: 0,
    };
    machine.block(&func.body)?;
    Ok(machine.outcome)
}

fn f(bits: u32) -> f32 {
    f32::from_bits(bits)
}

fn bool_bits(b: bool) -> u32 {
    if b {
        u32::MAX
    } else {
        0
    }
}

impl Machine<'_> {
    fn get(&self, value: Value) -> Result<Components, ExecError> {
        self.values
            .get(value.index())
            .copied()
            .flatten()
            .ok_or(ExecError::UndefinedValue(value))
    }

    fn scalar(&self, value: Value) -> Result<u32, ExecError> {
        Ok(self.get(value)?[0])
    }

    fn width(&self, value: Value) -> usize {
        self.func.num_components(value).clamp(1, 4) as usize
    }

    fn set(&mut self, value: Option<Value>, components: Components) {
        if let Some(slot) = value.and_then(|v| self.values.get_mut(v.index())) {
            *slot = Some(components);
        }
    }

    fn block(&mut self, block: &Block) -> Result<Flow, ExecError> {
        for instr in &block.instrs {
            let result = match &instr.op {
                Op::Imm { bits } => {
                    let mut out = [0; 4];
                    for (dst, src) in out.iter_mut().zip(bits) {
                        *dst = *src;
                    }
                    Some(out)
                }
                Op::Undef { .. } => Some([0; 4]),
                Op::Alu { op, srcs } => Some(self.alu(*op, srcs, instr.result)?),
                Op::Channel { src, component } => {
                    let v = self.get(*src)?;
                    let c = *v.get(*component as usize).ok_or(ExecError::ComponentOutOfRange {
                        value: *src,
                        component: *component,
                    })?;
                    Some([c, 0, 0, 0])
                }
                Op::Vec { srcs } => {
                    let mut out = [0; 4];
                    for (dst, src) in out.iter_mut().zip(srcs) {
                        *dst = self.scalar(*src)?;
                    }
                    Some(out)
                }
                Op::LoadInput {
                    component,
                    location,
                    num_components,
                    ..
                } => {
                    let mut out = [0; 4];
                    for i in 0..(*num_components).min(4) {
                        let comp = component + i;
                        out[i as usize] = *self.env.inputs.get(&(*location, comp)).ok_or(
                            ExecError::UnboundInput {
                                location: *location,
                                component: comp,
                            },
                        )?;
                    }
                    Some(out)
                }
                Op::LoadUniform {
                    base,
                    offset,
                    num_components,
                } => {
                    let addr = base.wrapping_add(self.scalar(*offset)?);
                    let mut out = [0; 4];
                    for i in 0..(*num_components).min(4) {
                        let byte = addr.wrapping_add(4 * i as u32);
                        out[i as usize] = *self
                            .env
                            .uniforms
                            .get((byte / 4) as usize)
                            .ok_or(ExecError::UniformOutOfBounds { addr: byte })?;
                    }
                    Some(out)
                }
                Op::StoreOutput {
                    src, offset, base, ..
                } => {
                    if self.width(*src) != 1 {
                        return Err(ExecError::NonScalarStore(*src));
                    }
                    let slot = base.wrapping_add(self.scalar(*offset)?);
                    let bits = self.scalar(*src)?;
                    self.outcome.vpm.insert(slot, bits);
                    self.outcome.stores.push(StoreEvent { slot, bits });
                    None
                }
                Op::EmitVertex | Op::EndPrimitive => {
                    return Err(ExecError::UnloweredIntrinsic(instr.op.name()))
                }
                Op::LoadViewportXScale => Some([self.env.viewport_x_scale.to_bits(), 0, 0, 0]),
                Op::LoadViewportYScale => Some([self.env.viewport_y_scale.to_bits(), 0, 0, 0]),
                Op::LoadViewportZScale => Some([self.env.viewport_z_scale.to_bits(), 0, 0, 0]),
                Op::LoadViewportZOffset => {
                    Some([self.env.viewport_z_offset.to_bits(), 0, 0, 0])
                }
                Op::LoadFbLayers => Some([self.env.fb_layers, 0, 0, 0]),
                Op::LoadVar { var } => {
                    let bits = self
                        .locals
                        .get(var.index())
                        .copied()
                        .flatten()
                        .ok_or(ExecError::UninitializedLocal(*var))?;
                    Some([bits, 0, 0, 0])
                }
                Op::StoreVar { var, src } => {
                    let bits = self.scalar(*src)?;
                    if let Some(slot) = self.locals.get_mut(var.index()) {
                        *slot = Some(bits);
                    }
                    None
                }
                Op::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let taken = if self.scalar(*cond)? != 0 {
                        then_block
                    } else {
                        else_block
                    };
                    if let Flow::Break = self.block(taken)? {
                        return Ok(Flow::Break);
                    }
                    None
                }
                Op::Loop { body } => {
                    loop {
                        self.loop_iterations += 1;
                        if self.loop_iterations > self.env.max_loop_iterations {
                            return Err(ExecError::LoopLimit(self.env.max_loop_iterations));
                        }
                        if let Flow::Break = self.block(body)? {
                            break;
                        }
                    }
                    None
                }
                Op::Break => return Ok(Flow::Break),
            };

            if let Some(components) = result {
                self.set(instr.result, components);
            }
        }
        Ok(Flow::Normal)
    }

    fn alu(
        &self,
        op: AluOp,
        srcs: &[Value],
        result: Option<Value>,
    ) -> Result<Components, ExecError> {
        let mut args = Vec::with_capacity(srcs.len());
        for src in srcs {
            args.push(self.get(*src)?);
        }
        let width = result.map_or(1, |v| self.width(v));
        let arg = |i: usize, c: usize| args.get(i).map_or(0, |a| a[c]);

        let mut out = [0; 4];
        for (c, dst) in out.iter_mut().enumerate().take(width) {
            let a = arg(0, c);
            let b = arg(1, c);
            *dst = match op {
                AluOp::Mov => a,
                AluOp::IAdd => a.wrapping_add(b),
                AluOp::ISub => a.wrapping_sub(b),
                AluOp::IMul => a.wrapping_mul(b),
                AluOp::Ishl => a.wrapping_shl(b),
                AluOp::Iand => a & b,
                AluOp::Ior => a | b,
                AluOp::Ige => bool_bits(a as i32 >= b as i32),
                AluOp::Uge => bool_bits(a >= b),
                AluOp::Ilt => bool_bits((a as i32) < b as i32),
                AluOp::Ieq => bool_bits(a == b),
                AluOp::Bcsel => {
                    if a != 0 {
                        b
                    } else {
                        arg(2, c)
                    }
                }
                AluOp::FAdd => (f(a) + f(b)).to_bits(),
                AluOp::FSub => (f(a) - f(b)).to_bits(),
                AluOp::FMul => (f(a) * f(b)).to_bits(),
                AluOp::FRcp => (1.0 / f(a)).to_bits(),
                AluOp::FFloor => f(a).floor().to_bits(),
                AluOp::F2I32 => (f(a) as i32) as u32,
                AluOp::I2F32 => (a as i32 as f32).to_bits(),
            };
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::ir::{Stage, WriteMask};

    fn shader_with(build: impl FnOnce(&mut Builder<'_>)) -> Shader {
        let mut shader = Shader::new(Stage::Vertex);
        let func = &mut shader.functions[0];
        let mut b = Builder::new(func);
        build(&mut b);
        let instrs = b.finish();
        func.body.instrs = instrs;
        shader
    }

    #[test]
    fn stores_land_at_base_plus_offset() {
        let shader = shader_with(|b| {
            let two = b.imm_uint(2);
            let v = b.imm_float(0.5);
            b.store_output(v, two, 3, 0, WriteMask::X, None);
        });
        let out = run(&shader, &ExecEnv::default()).unwrap();
        assert_eq!(out.float(5), Some(0.5));
        assert_eq!(out.stores.len(), 1);
    }

    #[test]
    fn float_pipeline() {
        let shader = shader_with(|b| {
            let zero = b.imm_uint(0);
            let x = b.load_input(0, 0, VaryingSlot::POS, 1, zero);
            let scale = b.load_viewport_x_scale();
            let scaled = b.fmul(x, scale);
            let floored = b.ffloor(scaled);
            let int = b.f2i32(floored);
            b.store_output(int, zero, 0, 0, WriteMask::X, None);
            let rcp = b.frcp(x);
            b.store_output(rcp, zero, 1, 0, WriteMask::X, None);
        });
        let env = ExecEnv {
            viewport_x_scale: 3.0,
            ..ExecEnv::default()
        }
        .with_input_f32(VaryingSlot::POS, 0, -1.25);
        let out = run(&shader, &env).unwrap();
        assert_eq!(out.int(0), Some(-4));
        assert_eq!(out.float(1), Some(-0.8));
    }

    #[test]
    fn loops_and_locals() {
        let shader = shader_with(|b| {
            let counter = b.add_local("counter");
            let zero = b.imm_uint(0);
            let limit = b.imm_uint(3);
            b.store_var(counter, zero);
            b.push_loop(|b| {
                let i = b.load_var(counter);
                let done = b.ige(i, limit);
                b.push_if(done, |b| b.push_break(), |_| {});
                b.store_output(i, i, 10, 0, WriteMask::X, None);
                let next = b.iadd_imm(i, 1);
                b.store_var(counter, next);
            });
        });
        let out = run(&shader, &ExecEnv::default()).unwrap();
        assert_eq!(
            out.vpm.into_iter().collect::<Vec<_>>(),
            vec![(10, 0), (11, 1), (12, 2)]
        );
    }

    #[test]
    fn infinite_loop_hits_limit() {
        let shader = shader_with(|b| b.push_loop(|_| {}));
        let env = ExecEnv {
            max_loop_iterations: 8,
            ..ExecEnv::default()
        };
        assert_eq!(run(&shader, &env), Err(ExecError::LoopLimit(8)));
    }

    #[test]
    fn rejects_unlowered_emit() {
        let mut shader = shader_with(|b| b.emit_vertex());
        shader.info.stage = Stage::Geometry;
        assert_eq!(
            run(&shader, &ExecEnv::default()),
            Err(ExecError::UnloweredIntrinsic("emit_vertex"))
        );
    }

    #[test]
    fn uniforms_are_byte_addressed() {
        let shader = shader_with(|b| {
            let offset = b.imm_uint(16);
            let u = b.load_uniform(4, offset, 1);
            let zero = b.imm_uint(0);
            b.store_output(u, zero, 0, 0, WriteMask::X, None);
        });
        let env = ExecEnv {
            uniforms: (0..8).collect(),
            ..ExecEnv::default()
        };
        let out = run(&shader, &env).unwrap();
        assert_eq!(out.word(0), Some(5));
    }
}
