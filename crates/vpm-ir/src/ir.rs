//! Core IR data model: shaders, functions, structured blocks and SSA values.

use std::fmt;

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    Vertex,
    TessControl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::TessControl => "tess_ctrl",
            Stage::TessEval => "tess_eval",
            Stage::Geometry => "geometry",
            Stage::Fragment => "fragment",
            Stage::Compute => "compute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// API-level varying identity (the "driver location" space before VPM lowering).
///
/// Fixed-function slots are numbered below [`VaryingSlot::VAR0`]; generic user varyings start at
/// `VAR0` and are addressed with [`VaryingSlot::var`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VaryingSlot(pub u32);

impl VaryingSlot {
    pub const POS: Self = Self(0);
    pub const COL0: Self = Self(1);
    pub const COL1: Self = Self(2);
    pub const FOGC: Self = Self(3);
    pub const TEX0: Self = Self(4);
    pub const TEX7: Self = Self(11);
    pub const PSIZ: Self = Self(12);
    pub const PNTC: Self = Self(13);
    pub const LAYER: Self = Self(14);
    pub const VIEWPORT: Self = Self(15);
    pub const VAR0: Self = Self(32);

    pub const fn tex(n: u32) -> Self {
        Self(Self::TEX0.0 + n)
    }

    pub const fn var(n: u32) -> Self {
        Self(Self::VAR0.0 + n)
    }

    /// Texture coordinate set index for `TEX0..=TEX7`.
    pub fn tex_index(self) -> Option<u32> {
        (Self::TEX0.0..=Self::TEX7.0)
            .contains(&self.0)
            .then(|| self.0 - Self::TEX0.0)
    }
}

impl fmt::Display for VaryingSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::POS => f.write_str("pos"),
            Self::COL0 => f.write_str("col0"),
            Self::COL1 => f.write_str("col1"),
            Self::FOGC => f.write_str("fogc"),
            Self::PSIZ => f.write_str("psiz"),
            Self::PNTC => f.write_str("pntc"),
            Self::LAYER => f.write_str("layer"),
            Self::VIEWPORT => f.write_str("viewport"),
            slot => {
                if let Some(n) = slot.tex_index() {
                    write!(f, "tex{n}")
                } else if slot.0 >= Self::VAR0.0 {
                    write!(f, "var{}", slot.0 - Self::VAR0.0)
                } else {
                    write!(f, "slot{}", slot.0)
                }
            }
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteMask: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const W = 1 << 3;
    }
}

impl WriteMask {
    /// Mask covering the first `num_components` channels.
    pub fn for_components(num_components: u8) -> Self {
        Self::from_bits_truncate(((1u16 << num_components.min(4)) - 1) as u8)
    }

    pub fn writes(self, component: u8) -> bool {
        component < 4 && self.bits() & (1 << component) != 0
    }
}

/// SSA value handle, local to one [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);

impl Value {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Function-local variable handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Local(u32);

impl Local {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub num_components: u8,
    /// Raw bits when the value is a scalar immediate.
    pub constant: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: String,
}

/// Shader input or output declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub location: VaryingSlot,
    /// First component of `location` covered by the variable.
    pub location_frac: u8,
    pub driver_location: u32,
}

impl Variable {
    pub fn new(name: impl Into<String>, location: VaryingSlot, driver_location: u32) -> Self {
        Self {
            name: name.into(),
            location,
            location_frac: 0,
            driver_location,
        }
    }

    pub fn with_location_frac(mut self, location_frac: u8) -> Self {
        self.location_frac = location_frac;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Mov,
    IAdd,
    ISub,
    IMul,
    Ishl,
    Iand,
    Ior,
    /// Signed `>=`, producing `!0` / `0`.
    Ige,
    /// Unsigned `>=`, producing `!0` / `0`.
    Uge,
    Ilt,
    Ieq,
    Bcsel,
    FAdd,
    FSub,
    FMul,
    FRcp,
    FFloor,
    F2I32,
    I2F32,
}

impl AluOp {
    pub fn name(self) -> &'static str {
        match self {
            AluOp::Mov => "mov",
            AluOp::IAdd => "iadd",
            AluOp::ISub => "isub",
            AluOp::IMul => "imul",
            AluOp::Ishl => "ishl",
            AluOp::Iand => "iand",
            AluOp::Ior => "ior",
            AluOp::Ige => "ige",
            AluOp::Uge => "uge",
            AluOp::Ilt => "ilt",
            AluOp::Ieq => "ieq",
            AluOp::Bcsel => "bcsel",
            AluOp::FAdd => "fadd",
            AluOp::FSub => "fsub",
            AluOp::FMul => "fmul",
            AluOp::FRcp => "frcp",
            AluOp::FFloor => "ffloor",
            AluOp::F2I32 => "f2i32",
            AluOp::I2F32 => "i2f32",
        }
    }

    pub fn num_srcs(self) -> usize {
        match self {
            AluOp::Mov | AluOp::FRcp | AluOp::FFloor | AluOp::F2I32 | AluOp::I2F32 => 1,
            AluOp::Bcsel => 3,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Imm {
        bits: Vec<u32>,
    },
    Undef {
        num_components: u8,
    },
    Alu {
        op: AluOp,
        srcs: Vec<Value>,
    },
    Channel {
        src: Value,
        component: u8,
    },
    Vec {
        srcs: Vec<Value>,
    },
    LoadInput {
        /// Driver location of the input variable.
        base: u32,
        component: u8,
        location: VaryingSlot,
        num_components: u8,
        offset: Value,
    },
    LoadUniform {
        base: u32,
        offset: Value,
        num_components: u8,
    },
    StoreOutput {
        src: Value,
        offset: Value,
        base: u32,
        component: u8,
        write_mask: WriteMask,
        /// API slot the store was written against; `None` for stores that already address the
        /// VPM directly (fixed-function outputs, headers).
        location: Option<VaryingSlot>,
    },
    EmitVertex,
    EndPrimitive,
    LoadViewportXScale,
    LoadViewportYScale,
    LoadViewportZScale,
    LoadViewportZOffset,
    LoadFbLayers,
    LoadVar {
        var: Local,
    },
    StoreVar {
        var: Local,
        src: Value,
    },
    If {
        cond: Value,
        then_block: Block,
        else_block: Block,
    },
    Loop {
        body: Block,
    },
    Break,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Imm { .. } => "imm",
            Op::Undef { .. } => "undef",
            Op::Alu { op, .. } => op.name(),
            Op::Channel { .. } => "channel",
            Op::Vec { .. } => "vec",
            Op::LoadInput { .. } => "load_input",
            Op::LoadUniform { .. } => "load_uniform",
            Op::StoreOutput { .. } => "store_output",
            Op::EmitVertex => "emit_vertex",
            Op::EndPrimitive => "end_primitive",
            Op::LoadViewportXScale => "load_viewport_x_scale",
            Op::LoadViewportYScale => "load_viewport_y_scale",
            Op::LoadViewportZScale => "load_viewport_z_scale",
            Op::LoadViewportZOffset => "load_viewport_z_offset",
            Op::LoadFbLayers => "load_fb_layers",
            Op::LoadVar { .. } => "load_var",
            Op::StoreVar { .. } => "store_var",
            Op::If { .. } => "if",
            Op::Loop { .. } => "loop",
            Op::Break => "break",
        }
    }

    /// SSA values read directly by this op (not including nested blocks).
    pub fn sources(&self) -> Vec<Value> {
        match self {
            Op::Alu { srcs, .. } | Op::Vec { srcs } => srcs.clone(),
            Op::Channel { src, .. } => vec![*src],
            Op::LoadInput { offset, .. } | Op::LoadUniform { offset, .. } => vec![*offset],
            Op::StoreOutput { src, offset, .. } => vec![*src, *offset],
            Op::StoreVar { src, .. } => vec![*src],
            Op::If { cond, .. } => vec![*cond],
            _ => Vec::new(),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Op::If { .. } | Op::Loop { .. })
    }

    pub fn for_each_block(&self, mut f: impl FnMut(&Block)) {
        match self {
            Op::If {
                then_block,
                else_block,
                ..
            } => {
                f(then_block);
                f(else_block);
            }
            Op::Loop { body } => f(body),
            _ => {}
        }
    }

    pub fn for_each_block_mut(&mut self, mut f: impl FnMut(&mut Block)) {
        match self {
            Op::If {
                then_block,
                else_block,
                ..
            } => {
                f(then_block);
                f(else_block);
            }
            Op::Loop { body } => f(body),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub result: Option<Value>,
    pub op: Op,
}

impl Instr {
    pub fn new(result: Value, op: Op) -> Self {
        Self {
            result: Some(result),
            op,
        }
    }

    pub fn void(op: Op) -> Self {
        Self { result: None, op }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub instrs: Vec<Instr>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Visits every instruction in source order, descending into nested blocks after the
    /// instruction that owns them.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Instr)) {
        for instr in &self.instrs {
            f(instr);
            match &instr.op {
                Op::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    then_block.walk(f);
                    else_block.walk(f);
                }
                Op::Loop { body } => body.walk(f),
                _ => {}
            }
        }
    }
}

impl From<Vec<Instr>> for Block {
    fn from(instrs: Vec<Instr>) -> Self {
        Self { instrs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub body: Block,
    pub locals: Vec<LocalDecl>,
    pub values: Vec<ValueInfo>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Block::new(),
            locals: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn new_value(&mut self, num_components: u8) -> Value {
        self.push_value(ValueInfo {
            num_components,
            constant: None,
        })
    }

    pub(crate) fn push_value(&mut self, info: ValueInfo) -> Value {
        let value = Value(self.values.len() as u32);
        self.values.push(info);
        value
    }

    pub fn value_info(&self, value: Value) -> Option<&ValueInfo> {
        self.values.get(value.index())
    }

    /// Component count of `value`; unknown handles report a single component.
    pub fn num_components(&self, value: Value) -> u8 {
        self.value_info(value).map_or(1, |info| info.num_components)
    }

    pub fn constant(&self, value: Value) -> Option<u32> {
        self.value_info(value).and_then(|info| info.constant)
    }

    pub fn add_local(&mut self, name: impl Into<String>) -> Local {
        let local = Local(self.locals.len() as u32);
        self.locals.push(LocalDecl { name: name.into() });
        local
    }

    /// Gives `instr` a fresh result value and returns the one it used to define.
    ///
    /// Replacement code can then define the returned value itself, which redirects every
    /// existing use to the replacement without touching the users.
    pub fn retarget_result(&mut self, instr: &mut Instr) -> Option<Value> {
        let old = instr.result?;
        let num_components = self.num_components(old);
        instr.result = Some(self.new_value(num_components));
        Some(old)
    }

    pub fn instruction_count(&self) -> usize {
        let mut count = 0;
        self.body.walk(&mut |_| count += 1);
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderInfo {
    pub stage: Stage,
    /// Declared maximum number of vertices emitted per geometry shader invocation.
    pub gs_vertices_out: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub info: ShaderInfo,
    pub inputs: Vec<Variable>,
    pub outputs: Vec<Variable>,
    pub functions: Vec<Function>,
}

impl Shader {
    pub fn new(stage: Stage) -> Self {
        Self {
            info: ShaderInfo {
                stage,
                gs_vertices_out: 0,
            },
            inputs: Vec::new(),
            outputs: Vec::new(),
            functions: vec![Function::new("main")],
        }
    }

    pub fn stage(&self) -> Stage {
        self.info.stage
    }

    pub fn entry_point(&self) -> Option<&Function> {
        self.functions.first()
    }

    pub fn entry_point_mut(&mut self) -> Option<&mut Function> {
        self.functions.first_mut()
    }

    pub fn find_output(&self, location: VaryingSlot, location_frac: u8) -> Option<&Variable> {
        self.outputs
            .iter()
            .find(|var| var.location == location && var.location_frac == location_frac)
    }
}
