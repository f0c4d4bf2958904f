//! Output declarations renumbered to their VPM word, so dumps of the lowered shader can map a
//! store back to the variable it writes.

use tracing::trace;
use vpm_ir::{Variable, VaryingSlot};

use crate::lower::VpmTarget;

pub(crate) fn update_output_driver_locations(
    outputs: &mut Vec<Variable>,
    target: &VpmTarget<'_>,
) {
    let layout = &target.layout;
    outputs.retain_mut(|var| {
        let fixed = match var.location {
            VaryingSlot::POS => layout.pos,
            VaryingSlot::PSIZ => layout.psiz,
            _ => None,
        };
        let resolved = fixed.or_else(|| {
            target
                .used
                .resolve(var.location, var.location_frac)
                .map(|slot| layout.varyings + slot)
        });

        match resolved {
            Some(driver_location) => {
                var.driver_location = driver_location;
                true
            }
            None => {
                trace!(name = %var.name, location = %var.location, "removing unread output");
                false
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::layout::VpmLayout;
    use crate::slot::{UsedOutputs, VaryingSlotRef};

    #[test]
    fn renumbers_and_removes() {
        let used = UsedOutputs::new(vec![
            VaryingSlotRef::new(VaryingSlot::var(1), 0),
            VaryingSlotRef::new(VaryingSlot::var(0), 2),
        ])
        .unwrap();
        let target = VpmTarget {
            layout: VpmLayout::fixed_function(false, true),
            used: &used,
        };
        let mut outputs = vec![
            Variable::new("gl_Position", VaryingSlot::POS, 0),
            Variable::new("gl_PointSize", VaryingSlot::PSIZ, 1),
            Variable::new("a", VaryingSlot::var(0), 2).with_location_frac(2),
            Variable::new("b", VaryingSlot::var(1), 3),
            Variable::new("unread", VaryingSlot::var(2), 4),
        ];
        update_output_driver_locations(&mut outputs, &target);

        let renumbered: Vec<(&str, u32)> = outputs
            .iter()
            .map(|v| (v.name.as_str(), v.driver_location))
            .collect();
        assert_eq!(
            renumbered,
            vec![("gl_Position", 0), ("gl_PointSize", 8), ("a", 10), ("b", 9)]
        );
    }

    #[test]
    fn coordinate_variant_drops_position() {
        let used = UsedOutputs::default();
        let target = VpmTarget {
            layout: VpmLayout::fixed_function(true, false),
            used: &used,
        };
        let mut outputs = vec![Variable::new("gl_Position", VaryingSlot::POS, 0)];
        update_output_driver_locations(&mut outputs, &target);
        assert!(outputs.is_empty());
    }
}
