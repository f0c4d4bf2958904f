//! Textual dump of the IR, used for debugging and diagnostics.

use std::fmt::{self, Write};

use crate::ir::{Block, Function, Instr, Op, Shader, Variable};

const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

fn component_char(component: u8) -> char {
    COMPONENTS.get(component as usize).copied().unwrap_or('?')
}

fn write_decl(f: &mut fmt::Formatter<'_>, kind: &str, var: &Variable) -> fmt::Result {
    writeln!(
        f,
        "decl_{kind} {}.{} \"{}\" (driver_location {})",
        var.location,
        component_char(var.location_frac),
        var.name,
        var.driver_location
    )
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{item}");
    }
    out
}

fn write_instr(
    f: &mut fmt::Formatter<'_>,
    func: &Function,
    instr: &Instr,
    indent: usize,
) -> fmt::Result {
    let pad = "  ".repeat(indent);
    write!(f, "{pad}")?;
    if let Some(result) = instr.result {
        write!(f, "{result} = ")?;
    }

    match &instr.op {
        Op::Imm { bits } => {
            let words: Vec<String> = bits.iter().map(|b| format!("0x{b:08x}")).collect();
            writeln!(f, "imm {}", words.join(", "))
        }
        Op::Undef { num_components } => writeln!(f, "undef {num_components}"),
        Op::Alu { op, srcs } => writeln!(f, "{} {}", op.name(), join(srcs)),
        Op::Channel { src, component } => writeln!(f, "{src}.{}", component_char(*component)),
        Op::Vec { srcs } => writeln!(f, "vec{} {}", srcs.len(), join(srcs)),
        Op::LoadInput {
            base,
            component,
            location,
            num_components,
            offset,
        } => writeln!(
            f,
            "load_input {offset} (base={base}, component={component}, location={location}, num_components={num_components})"
        ),
        Op::LoadUniform {
            base,
            offset,
            num_components,
        } => writeln!(
            f,
            "load_uniform {offset} (base={base}, num_components={num_components})"
        ),
        Op::StoreOutput {
            src,
            offset,
            base,
            component,
            write_mask,
            location,
        } => {
            write!(
                f,
                "store_output {src}, {offset} (base={base}, component={component}, wrmask=0x{:x}",
                write_mask.bits()
            )?;
            if let Some(location) = location {
                write!(f, ", location={location}")?;
            }
            writeln!(f, ")")
        }
        Op::LoadVar { var } => {
            let name = func.locals.get(var.index()).map_or("?", |l| l.name.as_str());
            writeln!(f, "load_var {var} ({name})")
        }
        Op::StoreVar { var, src } => {
            let name = func.locals.get(var.index()).map_or("?", |l| l.name.as_str());
            writeln!(f, "store_var {var} ({name}), {src}")
        }
        Op::If {
            cond,
            then_block,
            else_block,
        } => {
            writeln!(f, "if {cond} {{")?;
            write_block(f, func, then_block, indent + 1)?;
            if !else_block.is_empty() {
                writeln!(f, "{pad}}} else {{")?;
                write_block(f, func, else_block, indent + 1)?;
            }
            writeln!(f, "{pad}}}")
        }
        Op::Loop { body } => {
            writeln!(f, "loop {{")?;
            write_block(f, func, body, indent + 1)?;
            writeln!(f, "{pad}}}")
        }
        op => writeln!(f, "{}", op.name()),
    }
}

fn write_block(
    f: &mut fmt::Formatter<'_>,
    func: &Function,
    block: &Block,
    indent: usize,
) -> fmt::Result {
    for instr in &block.instrs {
        write_instr(f, func, instr, indent)?;
    }
    Ok(())
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} {{", self.name)?;
        for (i, local) in self.locals.iter().enumerate() {
            writeln!(f, "  decl_var @{i} \"{}\"", local.name)?;
        }
        write_block(f, self, &self.body, 1)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "shader: {}", self.info.stage)?;
        if self.info.gs_vertices_out != 0 {
            writeln!(f, "vertices_out: {}", self.info.gs_vertices_out)?;
        }
        for var in &self.inputs {
            write_decl(f, "in", var)?;
        }
        for var in &self.outputs {
            write_decl(f, "out", var)?;
        }
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        Ok(())
    }
}
