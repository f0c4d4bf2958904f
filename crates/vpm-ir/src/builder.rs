//! Instruction builder.
//!
//! A [`Builder`] borrows the [`Function`] that owns the value table and collects new instructions
//! in a pending list. The list is spliced into the body by the caller, either as a set of
//! [`crate::transform::Transform`]s returned from a rewrite callback or through
//! [`crate::transform::prepend_to_function`] / [`crate::transform::append_to_function`].
//!
//! Integer helpers that take an immediate fold when the other operand is a known scalar
//! immediate, and collapse identities (`x + 0`, `x << 0`) to the operand itself.

use crate::ir::{
    AluOp, Block, Function, Instr, Local, Op, Value, ValueInfo, VaryingSlot, WriteMask,
};
use crate::transform::Transform;

pub struct Builder<'f> {
    func: &'f mut Function,
    instrs: Vec<Instr>,
}

impl<'f> Builder<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            func,
            instrs: Vec::new(),
        }
    }

    pub fn function(&self) -> &Function {
        &*self.func
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Returns the pending instructions.
    pub fn finish(self) -> Vec<Instr> {
        self.instrs
    }

    /// Pending instructions as insertions at the cursor.
    pub fn into_transforms(self) -> Vec<Transform> {
        self.instrs.into_iter().map(Transform::Add).collect()
    }

    fn push(&mut self, op: Op, num_components: u8) -> Value {
        let value = self.func.new_value(num_components);
        self.instrs.push(Instr::new(value, op));
        value
    }

    pub fn push_void(&mut self, op: Op) {
        self.instrs.push(Instr::void(op));
    }

    /// Emits `op` as the definition of an already-allocated value.
    pub fn define(&mut self, result: Value, op: Op) {
        self.instrs.push(Instr::new(result, op));
    }

    pub fn imm_uint(&mut self, bits: u32) -> Value {
        let value = self.func.push_value(ValueInfo {
            num_components: 1,
            constant: Some(bits),
        });
        self.instrs.push(Instr::new(value, Op::Imm { bits: vec![bits] }));
        value
    }

    pub fn imm_int(&mut self, value: i32) -> Value {
        self.imm_uint(value as u32)
    }

    pub fn imm_float(&mut self, value: f32) -> Value {
        self.imm_uint(value.to_bits())
    }

    pub fn undef(&mut self, num_components: u8) -> Value {
        self.push(Op::Undef { num_components }, num_components)
    }

    pub fn alu(&mut self, op: AluOp, srcs: &[Value]) -> Value {
        // Bcsel takes its width from the selected operands, everything else from the first source.
        let width_src = match op {
            AluOp::Bcsel => srcs.get(1),
            _ => srcs.first(),
        };
        let num_components = width_src.map_or(1, |&v| self.func.num_components(v));
        self.push(
            Op::Alu {
                op,
                srcs: srcs.to_vec(),
            },
            num_components,
        )
    }

    pub fn mov(&mut self, src: Value) -> Value {
        self.alu(AluOp::Mov, &[src])
    }

    pub fn iadd(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::IAdd, &[a, b])
    }

    pub fn iadd_imm(&mut self, a: Value, imm: i32) -> Value {
        if imm == 0 {
            return a;
        }
        if let Some(bits) = self.func.constant(a) {
            return self.imm_uint(bits.wrapping_add(imm as u32));
        }
        let imm = self.imm_int(imm);
        self.iadd(a, imm)
    }

    pub fn ishl_imm(&mut self, a: Value, shift: u32) -> Value {
        if shift == 0 {
            return a;
        }
        if let Some(bits) = self.func.constant(a) {
            return self.imm_uint(bits.wrapping_shl(shift));
        }
        let shift = self.imm_uint(shift);
        self.alu(AluOp::Ishl, &[a, shift])
    }

    pub fn iand_imm(&mut self, a: Value, mask: u32) -> Value {
        if mask == u32::MAX {
            return a;
        }
        if let Some(bits) = self.func.constant(a) {
            return self.imm_uint(bits & mask);
        }
        let mask = self.imm_uint(mask);
        self.alu(AluOp::Iand, &[a, mask])
    }

    pub fn ior(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::Ior, &[a, b])
    }

    pub fn ior_imm(&mut self, a: Value, bits: u32) -> Value {
        if bits == 0 {
            return a;
        }
        if let Some(a_bits) = self.func.constant(a) {
            return self.imm_uint(a_bits | bits);
        }
        let bits = self.imm_uint(bits);
        self.ior(a, bits)
    }

    pub fn ige(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::Ige, &[a, b])
    }

    pub fn uge(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::Uge, &[a, b])
    }

    pub fn ilt(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::Ilt, &[a, b])
    }

    pub fn bcsel(&mut self, cond: Value, if_true: Value, if_false: Value) -> Value {
        self.alu(AluOp::Bcsel, &[cond, if_true, if_false])
    }

    pub fn fadd(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::FAdd, &[a, b])
    }

    pub fn fmul(&mut self, a: Value, b: Value) -> Value {
        self.alu(AluOp::FMul, &[a, b])
    }

    /// `imm - src`.
    pub fn fsub_imm(&mut self, imm: f32, src: Value) -> Value {
        let imm = self.imm_float(imm);
        self.alu(AluOp::FSub, &[imm, src])
    }

    pub fn frcp(&mut self, src: Value) -> Value {
        self.alu(AluOp::FRcp, &[src])
    }

    pub fn ffloor(&mut self, src: Value) -> Value {
        self.alu(AluOp::FFloor, &[src])
    }

    pub fn f2i32(&mut self, src: Value) -> Value {
        self.alu(AluOp::F2I32, &[src])
    }

    pub fn i2f32(&mut self, src: Value) -> Value {
        self.alu(AluOp::I2F32, &[src])
    }

    /// Extracts one component; scalars are returned unchanged for component 0.
    pub fn channel(&mut self, src: Value, component: u8) -> Value {
        if component == 0 && self.func.num_components(src) == 1 {
            return src;
        }
        self.push(Op::Channel { src, component }, 1)
    }

    pub fn vec(&mut self, srcs: &[Value]) -> Value {
        self.push(
            Op::Vec {
                srcs: srcs.to_vec(),
            },
            srcs.len() as u8,
        )
    }

    pub fn load_input(
        &mut self,
        base: u32,
        component: u8,
        location: VaryingSlot,
        num_components: u8,
        offset: Value,
    ) -> Value {
        self.push(
            Op::LoadInput {
                base,
                component,
                location,
                num_components,
                offset,
            },
            num_components,
        )
    }

    pub fn load_uniform(&mut self, base: u32, offset: Value, num_components: u8) -> Value {
        self.push(
            Op::LoadUniform {
                base,
                offset,
                num_components,
            },
            num_components,
        )
    }

    pub fn store_output(
        &mut self,
        src: Value,
        offset: Value,
        base: u32,
        component: u8,
        write_mask: WriteMask,
        location: Option<VaryingSlot>,
    ) {
        self.push_void(Op::StoreOutput {
            src,
            offset,
            base,
            component,
            write_mask,
            location,
        });
    }

    pub fn emit_vertex(&mut self) {
        self.push_void(Op::EmitVertex);
    }

    pub fn end_primitive(&mut self) {
        self.push_void(Op::EndPrimitive);
    }

    pub fn load_viewport_x_scale(&mut self) -> Value {
        self.push(Op::LoadViewportXScale, 1)
    }

    pub fn load_viewport_y_scale(&mut self) -> Value {
        self.push(Op::LoadViewportYScale, 1)
    }

    pub fn load_viewport_z_scale(&mut self) -> Value {
        self.push(Op::LoadViewportZScale, 1)
    }

    pub fn load_viewport_z_offset(&mut self) -> Value {
        self.push(Op::LoadViewportZOffset, 1)
    }

    pub fn load_fb_layers(&mut self) -> Value {
        self.push(Op::LoadFbLayers, 1)
    }

    pub fn add_local(&mut self, name: impl Into<String>) -> Local {
        self.func.add_local(name)
    }

    pub fn load_var(&mut self, var: Local) -> Value {
        self.push(Op::LoadVar { var }, 1)
    }

    pub fn store_var(&mut self, var: Local, src: Value) {
        self.push_void(Op::StoreVar { var, src });
    }

    /// Emits a structured `if`. Each closure builds one side into its own block.
    pub fn push_if(
        &mut self,
        cond: Value,
        then_body: impl FnOnce(&mut Builder<'_>),
        else_body: impl FnOnce(&mut Builder<'_>),
    ) {
        let then_block = self.nested(then_body);
        let else_block = self.nested(else_body);
        self.push_void(Op::If {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn push_loop(&mut self, body: impl FnOnce(&mut Builder<'_>)) {
        let body = self.nested(body);
        self.push_void(Op::Loop { body });
    }

    pub fn push_break(&mut self) {
        self.push_void(Op::Break);
    }

    fn nested(&mut self, build: impl FnOnce(&mut Builder<'_>)) -> Block {
        let mut inner = Builder::new(&mut *self.func);
        build(&mut inner);
        Block::from(inner.finish())
    }
}
