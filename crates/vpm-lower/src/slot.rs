//! Mapping from API varyings to the consumer-negotiated scalar slot order.

use vpm_ir::VaryingSlot;

use crate::error::LowerIoError;
use crate::limits::MAX_VARYING_SLOTS;

/// One scalar component of an API varying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VaryingSlotRef {
    pub location: VaryingSlot,
    pub component: u8,
}

impl VaryingSlotRef {
    pub const fn new(location: VaryingSlot, component: u8) -> Self {
        Self {
            location,
            component,
        }
    }
}

/// Ordered list of the scalar varyings the next stage reads.
///
/// The index of an entry is its scalar slot in the varying region of the VPM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<VaryingSlotRef>", into = "Vec<VaryingSlotRef>")
)]
pub struct UsedOutputs {
    slots: Vec<VaryingSlotRef>,
}

impl UsedOutputs {
    pub fn new(slots: Vec<VaryingSlotRef>) -> Result<Self, LowerIoError> {
        if slots.len() > MAX_VARYING_SLOTS {
            return Err(LowerIoError::TooManyUsedOutputs { count: slots.len() });
        }
        Ok(Self { slots })
    }

    /// Every component of each location, in order: `vec4`-granular negotiation.
    pub fn from_locations(locations: &[VaryingSlot]) -> Result<Self, LowerIoError> {
        let slots = locations
            .iter()
            .flat_map(|&location| (0..4).map(move |c| VaryingSlotRef::new(location, c)))
            .collect();
        Self::new(slots)
    }

    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn as_slice(&self) -> &[VaryingSlotRef] {
        &self.slots
    }

    /// Scalar slot of `(location, component)`, or `None` if the consumer never reads it.
    ///
    /// Duplicate entries resolve to the first match.
    pub fn resolve(&self, location: VaryingSlot, component: u8) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| s.location == location && s.component == component)
            .map(|i| i as u32)
    }
}

impl TryFrom<Vec<VaryingSlotRef>> for UsedOutputs {
    type Error = LowerIoError;

    fn try_from(slots: Vec<VaryingSlotRef>) -> Result<Self, Self::Error> {
        Self::new(slots)
    }
}

impl From<UsedOutputs> for Vec<VaryingSlotRef> {
    fn from(used: UsedOutputs) -> Self {
        used.slots
    }
}

/// Set of varying slots that received a real store in the current function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct VaryingsStored(u64);

impl VaryingsStored {
    pub(crate) fn insert(&mut self, slot: u32) {
        if let Some(bit) = 1u64.checked_shl(slot) {
            self.0 |= bit;
        }
    }

    pub(crate) fn contains(self, slot: u32) -> bool {
        1u64.checked_shl(slot).is_some_and(|bit| self.0 & bit != 0)
    }

    /// Slots below `count` that were never stored.
    pub(crate) fn missing(self, count: u32) -> impl Iterator<Item = u32> {
        (0..count).filter(move |&slot| !self.contains(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn used() -> UsedOutputs {
        UsedOutputs::new(vec![
            VaryingSlotRef::new(VaryingSlot::var(0), 0),
            VaryingSlotRef::new(VaryingSlot::var(0), 1),
            VaryingSlotRef::new(VaryingSlot::COL0, 2),
            VaryingSlotRef::new(VaryingSlot::var(0), 0),
        ])
        .unwrap()
    }

    #[test]
    fn resolves_first_match() {
        let used = used();
        assert_eq!(used.resolve(VaryingSlot::var(0), 0), Some(0));
        assert_eq!(used.resolve(VaryingSlot::var(0), 1), Some(1));
        assert_eq!(used.resolve(VaryingSlot::COL0, 2), Some(2));
    }

    #[test]
    fn unknown_varyings_are_unused() {
        let used = used();
        assert_eq!(used.resolve(VaryingSlot::COL0, 0), None);
        assert_eq!(used.resolve(VaryingSlot::var(1), 0), None);
        assert_eq!(UsedOutputs::default().resolve(VaryingSlot::POS, 0), None);
    }

    #[test]
    fn resolve_is_deterministic() {
        let used = used();
        for _ in 0..3 {
            assert_eq!(used.resolve(VaryingSlot::COL0, 2), Some(2));
        }
    }

    #[test]
    fn from_locations_expands_components() {
        let used = UsedOutputs::from_locations(&[VaryingSlot::var(2), VaryingSlot::var(5)]).unwrap();
        assert_eq!(used.len(), 8);
        assert_eq!(used.resolve(VaryingSlot::var(5), 3), Some(7));
    }

    #[test]
    fn rejects_oversized_tables() {
        let slots = vec![VaryingSlotRef::new(VaryingSlot::var(0), 0); MAX_VARYING_SLOTS + 1];
        assert_eq!(
            UsedOutputs::new(slots),
            Err(LowerIoError::TooManyUsedOutputs {
                count: MAX_VARYING_SLOTS + 1
            })
        );
        let slots = vec![VaryingSlotRef::new(VaryingSlot::var(0), 0); MAX_VARYING_SLOTS];
        assert!(UsedOutputs::new(slots).is_ok());
    }

    #[test]
    fn stored_bitset() {
        let mut stored = VaryingsStored::default();
        stored.insert(0);
        stored.insert(63);
        stored.insert(64);
        assert!(stored.contains(63));
        assert!(!stored.contains(64));
        assert_eq!(stored.missing(4).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
