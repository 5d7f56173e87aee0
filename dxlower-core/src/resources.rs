//! Resource binding information consumed by the lowering engine.
//!
//! The resource analysis that discovers declarations runs before this crate
//! and hands over a `ResourceMap`; lowering only reads it.

use crate::ir::ValueId;
use indexmap::IndexMap;

/// The register class a resource is bound to. The discriminant values are
/// the DXIL resource class encoding used in handle creation and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Srv = 0,
    Uav = 1,
    CBuffer = 2,
    Sampler = 3,
}

/// Where a resource lives in register space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBinding {
    pub record_id: u32,
    pub space: u32,
    pub lower_bound: u32,
    pub size: u32,
}

impl ResourceBinding {
    /// Inclusive upper bound of the binding range. The binding must cover at
    /// least one register; `u32::MAX` for `size` encodes an unbounded range
    /// and saturates at the top of the register space.
    pub fn upper_bound(&self) -> u32 {
        debug_assert!(self.size > 0, "BUG: resource binding covers no registers");
        self.lower_bound.saturating_add(self.size - 1)
    }
}

/// Everything the lowering engine needs to know about one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    pub class: ResourceClass,
    pub binding: ResourceBinding,
    /// Two opaque property words consumed by `annotateHandle`.
    pub annotate_props: (u32, u32),
}

/// Map from handle-creating call sites to their resource info. Iteration
/// order is insertion order, so emitted metadata is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    entries: IndexMap<ValueId, ResourceInfo>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, call: ValueId, info: ResourceInfo) {
        self.entries.insert(call, info);
    }

    pub fn by_call_site(&self, call: ValueId) -> Option<&ResourceInfo> {
        self.entries.get(&call)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ValueId, &ResourceInfo)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_bound_is_inclusive() {
        let binding = ResourceBinding {
            record_id: 0,
            space: 0,
            lower_bound: 5,
            size: 4,
        };
        assert_eq!(binding.upper_bound(), 8);
    }

    #[test]
    fn unbounded_range_saturates() {
        let binding = ResourceBinding {
            record_id: 0,
            space: 0,
            lower_bound: 2,
            size: u32::MAX,
        };
        assert_eq!(binding.upper_bound(), u32::MAX);
    }

    #[test]
    #[should_panic(expected = "covers no registers")]
    fn zero_sized_binding_is_rejected() {
        let binding = ResourceBinding {
            record_id: 0,
            space: 0,
            lower_bound: 0,
            size: 0,
        };
        binding.upper_bound();
    }
}
