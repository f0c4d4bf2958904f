//! Batch-edit traversal.
//!
//! [`for_each_instruction`] walks every block of a function in source order and lets the callback
//! describe what should replace each visited instruction. Blocks are rebuilt as the walk advances,
//! so nothing is unlinked while it is being iterated. Structured control instructions (`if`,
//! `loop`) are not handed to the callback; their blocks are walked instead, before the
//! instructions that follow them.

use crate::ir::{Block, Function, Instr};

#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// Keep the visited instruction at this position. Only needed alongside other transforms; an
    /// empty transform list keeps the instruction unchanged.
    Keep,
    /// Drop the visited instruction. Only needed when it is the sole transform; any non-empty list
    /// without [`Transform::Keep`] drops it as well.
    Remove,
    /// Insert a new instruction at this position.
    Add(Instr),
}

pub fn for_each_instruction<F>(function: &mut Function, mut f: F)
where
    F: FnMut(&mut Function, &mut Instr) -> Vec<Transform>,
{
    let mut body = std::mem::take(&mut function.body);
    transform_block(function, &mut body, &mut f);
    function.body = body;
}

fn transform_block<F>(function: &mut Function, block: &mut Block, f: &mut F)
where
    F: FnMut(&mut Function, &mut Instr) -> Vec<Transform>,
{
    let old = std::mem::take(&mut block.instrs);
    let mut new = Vec::with_capacity(old.len());

    for mut instr in old {
        if instr.op.is_control() {
            instr
                .op
                .for_each_block_mut(|child| transform_block(function, child, f));
            new.push(instr);
            continue;
        }

        let transforms = f(function, &mut instr);
        apply(&mut new, instr, transforms);
    }

    block.instrs = new;
}

fn apply(out: &mut Vec<Instr>, original: Instr, transforms: Vec<Transform>) {
    if transforms.is_empty() {
        out.push(original);
        return;
    }

    let mut original = Some(original);
    for transform in transforms {
        match transform {
            Transform::Keep => {
                if let Some(instr) = original.take() {
                    out.push(instr);
                }
            }
            Transform::Remove => {}
            Transform::Add(instr) => out.push(instr),
        }
    }
}

/// Inserts `instrs` before the first instruction of the function body.
pub fn prepend_to_function(function: &mut Function, instrs: Vec<Instr>) {
    function.body.instrs.splice(0..0, instrs);
}

/// Inserts `instrs` after the last instruction of the function body.
pub fn append_to_function(function: &mut Function, instrs: Vec<Instr>) {
    function.body.instrs.extend(instrs);
}
