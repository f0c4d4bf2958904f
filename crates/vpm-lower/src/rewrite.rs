//! Per-instruction rewrites.

use tracing::trace;
use vpm_ir::{AluOp, Builder, Function, Instr, Op, Transform, Value, VaryingSlot};

use crate::ff::store_vpm;
use crate::key::{Environment, FsKey, StageKey, VsKey};
use crate::limits::{ARRAY_ELEMENT_SLOTS, UNIFORM_SLOT_BYTES, UNIFORM_SLOT_SHIFT};
use crate::lower::LowerState;

/// Replaces the visited instruction with whatever `b` emitted, which may be nothing.
pub(crate) fn replace_with(b: Builder<'_>) -> Vec<Transform> {
    let mut transforms = b.into_transforms();
    if transforms.is_empty() {
        transforms.push(Transform::Remove);
    }
    transforms
}

impl LowerState<'_> {
    pub(crate) fn rewrite_instr(
        &mut self,
        func: &mut Function,
        instr: &mut Instr,
    ) -> Vec<Transform> {
        let key = self.key;
        match instr.op {
            Op::LoadInput { .. } => match key {
                StageKey::Vertex(key) => lower_vertex_input(key, func, instr),
                StageKey::Fragment(key) => self.lower_fragment_input(key, func, instr),
                _ => Vec::new(),
            },
            Op::LoadUniform { .. } => lower_uniform(key.environment(), func, instr),
            Op::StoreOutput { .. } if self.target.is_some() => {
                self.lower_store_output(func, instr)
            }
            Op::EmitVertex => self.lower_emit_vertex(func),
            Op::EndPrimitive => self.lower_end_primitive(func),
            _ => Vec::new(),
        }
    }

    /// Point coordinates are read as `(s, t, 0, 1)`, and only carry real values when points are
    /// rasterized.
    fn lower_fragment_input(
        &self,
        key: &FsKey,
        func: &mut Function,
        instr: &mut Instr,
    ) -> Vec<Transform> {
        // OpenGL has already lowered the point coordinate origin.
        if key.environment == Environment::OpenGl {
            return Vec::new();
        }
        let Op::LoadInput {
            base,
            component,
            num_components,
            ..
        } = instr.op
        else {
            return Vec::new();
        };
        let Some(var) = self.inputs.iter().find(|var| var.driver_location == base) else {
            return Vec::new();
        };
        if !key.point_sprite_mask.replaces(var.location) {
            return Vec::new();
        }

        let rewritten = |c: u8| match c {
            0 => !key.is_points,
            1 => !key.is_points || key.point_coord_upper_left,
            _ => true,
        };
        if !(0..num_components).any(|i| rewritten(component + i)) {
            return Vec::new();
        }

        let Some(original) = func.retarget_result(instr) else {
            return Vec::new();
        };
        let Some(loaded) = instr.result else {
            return Vec::new();
        };

        let mut b = Builder::new(func);
        let mut channels = Vec::with_capacity(num_components as usize);
        for i in 0..num_components {
            let c = component + i;
            let mut value = match c {
                0 | 1 if key.is_points => b.channel(loaded, i),
                0..=2 => b.imm_float(0.0),
                _ => b.imm_float(1.0),
            };
            if key.point_coord_upper_left && c == 1 {
                value = b.fsub_imm(1.0, value);
            }
            channels.push(value);
        }
        trace!(location = %var.location, component, "rewrote point coordinate load");

        let op = match channels.as_slice() {
            [single] => Op::Alu {
                op: AluOp::Mov,
                srcs: vec![*single],
            },
            _ => Op::Vec { srcs: channels },
        };
        b.define(original, op);

        let mut transforms = vec![Transform::Keep];
        transforms.extend(b.into_transforms());
        transforms
    }

    fn lower_store_output(&mut self, func: &mut Function, instr: &mut Instr) -> Vec<Transform> {
        let Some(target) = self.target else {
            return Vec::new();
        };
        let &Op::StoreOutput {
            src,
            offset,
            component,
            write_mask,
            location: Some(location),
            ..
        } = &instr.op
        else {
            // Already addressed by VPM word.
            return Vec::new();
        };

        let mut b = Builder::new(func);
        let cursor = self.gs.map(|gs| b.load_var(gs.locals.output_offset));
        let num_components = b.function().num_components(src);

        if location == VaryingSlot::POS {
            for i in 0..num_components {
                let c = usize::from(component + i);
                if write_mask.writes(i) && c < self.pos.len() {
                    self.pos[c] = Some(b.channel(src, i));
                }
            }
        }

        if location == VaryingSlot::PSIZ {
            if let Some(psiz) = target.layout.psiz {
                let size = b.channel(src, 0);
                store_vpm(&mut b, psiz, cursor, size);
            }
        }

        if location == VaryingSlot::LAYER {
            if let Some(gs) = self.gs {
                let layer = b.channel(src, 0);
                gs.store_layer(&mut b, layer);
            }
        }

        // A non-constant array index is not applied; the store goes to the first element.
        let array_offset = b.function().constant(offset);
        for i in 0..num_components {
            if !write_mask.writes(i) {
                continue;
            }
            let Some(slot) = target.used.resolve(location, component + i) else {
                trace!(%location, component = component + i, "dropping store to unused varying");
                continue;
            };
            let slot = match array_offset {
                Some(element) => element
                    .checked_mul(ARRAY_ELEMENT_SLOTS)
                    .and_then(|words| slot.checked_add(words)),
                None => Some(slot),
            };
            let Some(slot) = slot.filter(|&slot| slot < target.used.len()) else {
                trace!(
                    %location,
                    component = component + i,
                    "dropping store past the varying table"
                );
                continue;
            };

            self.varyings_stored.insert(slot);
            let chan = b.channel(src, i);
            store_vpm(&mut b, target.layout.varyings + slot, cursor, chan);
        }

        replace_with(b)
    }
}

/// Swaps R and B of attributes whose format the hardware fetches in the wrong order.
fn lower_vertex_input(key: &VsKey, func: &mut Function, instr: &mut Instr) -> Vec<Transform> {
    let Op::LoadInput {
        base,
        component,
        location,
        num_components,
        offset,
    } = &mut instr.op
    else {
        return Vec::new();
    };
    if !key.swaps_rb(*location) {
        return Vec::new();
    }

    if *num_components == 1 {
        let (from, to) = (*component, swap_rb(*component));
        if from != to {
            let location = *location;
            trace!(%location, from, to, "swapped vertex input component");
            *component = to;
        }
        return Vec::new();
    }

    let Some(result) = instr.result else {
        return Vec::new();
    };
    let (base, component, location, num_components, offset) =
        (*base, *component, *location, *num_components, *offset);

    let mut b = Builder::new(func);
    let channels: Vec<Value> = (0..num_components)
        .map(|i| b.load_input(base, swap_rb(component + i), location, 1, offset))
        .collect();
    b.define(result, Op::Vec { srcs: channels });
    trace!(%location, num_components, "split swizzled vertex input");
    replace_with(b)
}

fn swap_rb(component: u8) -> u8 {
    match component {
        0 | 2 => (component + 2) % 4,
        c => c,
    }
}

/// OpenGL uniform offsets count `vec4` slots; the backend addresses uniforms in bytes.
fn lower_uniform(
    environment: Environment,
    func: &mut Function,
    instr: &mut Instr,
) -> Vec<Transform> {
    if environment == Environment::Vulkan {
        return Vec::new();
    }
    let Op::LoadUniform { base, offset, .. } = &mut instr.op else {
        return Vec::new();
    };

    let mut b = Builder::new(func);
    *offset = b.ishl_imm(*offset, UNIFORM_SLOT_SHIFT);
    *base = base.wrapping_mul(UNIFORM_SLOT_BYTES);

    let mut transforms = b.into_transforms();
    transforms.push(Transform::Keep);
    transforms
}
