//! Structural validation of a [`Shader`].

use thiserror::Error;

use crate::ir::{Block, Function, Local, Op, Shader, Stage, Value};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("function `{function}`: {value} is used before it is defined")]
    UseBeforeDef { function: String, value: Value },
    #[error("function `{function}`: {value} is defined more than once")]
    Redefinition { function: String, value: Value },
    #[error("function `{function}`: {value} is not allocated in the value table")]
    UnknownValue { function: String, value: Value },
    #[error("function `{function}`: local {local} is not declared")]
    UnknownLocal { function: String, local: Local },
    #[error("function `{function}`: break outside of a loop")]
    BreakOutsideLoop { function: String },
    #[error("function `{function}`: {op} is only valid in geometry shaders, found in a {stage} shader")]
    GeometryOnly {
        function: String,
        op: &'static str,
        stage: Stage,
    },
}

pub fn verify_shader(shader: &Shader) -> Result<(), VerifyError> {
    for function in &shader.functions {
        verify_function(shader.stage(), function)?;
    }
    Ok(())
}

pub fn verify_function(stage: Stage, function: &Function) -> Result<(), VerifyError> {
    let mut verifier = Verifier {
        stage,
        function,
        in_scope: vec![false; function.values.len()],
        defined: vec![false; function.values.len()],
    };
    verifier.block(&function.body, 0)
}

struct Verifier<'a> {
    stage: Stage,
    function: &'a Function,
    /// Values visible at the current instruction. Definitions inside an `if` arm or a loop body
    /// leave scope when that block ends.
    in_scope: Vec<bool>,
    /// Values defined anywhere so far.
    defined: Vec<bool>,
}

impl Verifier<'_> {
    fn name(&self) -> String {
        self.function.name.clone()
    }

    fn block(&mut self, block: &Block, loop_depth: u32) -> Result<(), VerifyError> {
        let mut local_defs = Vec::new();
        let result = self.instrs(block, loop_depth, &mut local_defs);
        for value in local_defs {
            self.in_scope[value.index()] = false;
        }
        result
    }

    fn instrs(
        &mut self,
        block: &Block,
        loop_depth: u32,
        local_defs: &mut Vec<Value>,
    ) -> Result<(), VerifyError> {
        for instr in &block.instrs {
            for value in instr.op.sources() {
                match self.in_scope.get(value.index()) {
                    None => {
                        return Err(VerifyError::UnknownValue {
                            function: self.name(),
                            value,
                        })
                    }
                    Some(false) => {
                        return Err(VerifyError::UseBeforeDef {
                            function: self.name(),
                            value,
                        })
                    }
                    Some(true) => {}
                }
            }

            match &instr.op {
                Op::LoadVar { var } | Op::StoreVar { var, .. } => {
                    if var.index() >= self.function.locals.len() {
                        return Err(VerifyError::UnknownLocal {
                            function: self.name(),
                            local: *var,
                        });
                    }
                }
                Op::Break if loop_depth == 0 => {
                    return Err(VerifyError::BreakOutsideLoop {
                        function: self.name(),
                    });
                }
                Op::EmitVertex | Op::EndPrimitive if self.stage != Stage::Geometry => {
                    return Err(VerifyError::GeometryOnly {
                        function: self.name(),
                        op: instr.op.name(),
                        stage: self.stage,
                    });
                }
                _ => {}
            }

            if let Some(result) = instr.result {
                match self.defined.get_mut(result.index()) {
                    None => {
                        return Err(VerifyError::UnknownValue {
                            function: self.name(),
                            value: result,
                        })
                    }
                    Some(true) => {
                        return Err(VerifyError::Redefinition {
                            function: self.name(),
                            value: result,
                        })
                    }
                    Some(slot) => *slot = true,
                }
                self.in_scope[result.index()] = true;
                local_defs.push(result);
            }

            match &instr.op {
                Op::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    self.block(then_block, loop_depth)?;
                    self.block(else_block, loop_depth)?;
                }
                Op::Loop { body } => self.block(body, loop_depth + 1)?,
                _ => {}
            }
        }
        Ok(())
    }
}
