use std::collections::BTreeSet;

use serde::Serialize;

use crate::boundary::RegionView;
use crate::ids::{AreaId, CellId, RegionId};

/// Spawn scope inside a region. Equality, ordering and hashing are
/// structural so the value can key a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SpawnLocation {
    region: RegionId,
    areas: BTreeSet<AreaId>,
    cells: BTreeSet<CellId>,
    owner_area: Option<AreaId>,
}

impl SpawnLocation {
    /// The whole region, unrestricted.
    pub fn region(region: RegionId) -> Self {
        Self {
            region,
            areas: BTreeSet::new(),
            cells: BTreeSet::new(),
            owner_area: None,
        }
    }

    /// Scope owned by a single area, used by area population events.
    pub fn area(region: RegionId, area: AreaId) -> Self {
        Self {
            region,
            areas: BTreeSet::from([area]),
            cells: BTreeSet::new(),
            owner_area: Some(area),
        }
    }

    pub fn restricted(region: RegionId, areas: &[AreaId], cells: &[CellId]) -> Self {
        Self {
            region,
            areas: areas.iter().copied().collect(),
            cells: cells.iter().copied().collect(),
            owner_area: None,
        }
    }

    /// Derives a child scope. Non-empty restrictions replace the parent's;
    /// empty ones inherit it.
    pub fn narrowed(&self, areas: &[AreaId], cells: &[CellId]) -> Self {
        let mut child = self.clone();
        if !areas.is_empty() {
            child.areas = areas.iter().copied().collect();
        }
        if !cells.is_empty() {
            child.cells = cells.iter().copied().collect();
        }
        child
    }

    pub fn region_id(&self) -> RegionId {
        self.region
    }

    pub fn areas(&self) -> &BTreeSet<AreaId> {
        &self.areas
    }

    pub fn cells(&self) -> &BTreeSet<CellId> {
        &self.cells
    }

    pub fn owner_area(&self) -> Option<AreaId> {
        self.owner_area
    }

    pub fn allows_area(&self, area: AreaId) -> bool {
        self.areas.is_empty() || self.areas.contains(&area)
    }

    pub fn allows_cell(&self, cell: CellId) -> bool {
        self.cells.is_empty() || self.cells.contains(&cell)
    }

    pub fn spawnable_area(&self, region: &dyn RegionView) -> f32 {
        region.spawnable_area(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_is_structural() {
        let a = SpawnLocation::restricted(RegionId(1), &[AreaId(3), AreaId(2)], &[]);
        let b = SpawnLocation::restricted(RegionId(1), &[AreaId(2), AreaId(3)], &[]);
        let c = SpawnLocation::restricted(RegionId(1), &[AreaId(2)], &[]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<SpawnLocation> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn narrowed_inherits_empty_restrictions() {
        let parent = SpawnLocation::restricted(RegionId(1), &[AreaId(5)], &[CellId(9)]);
        let child = parent.narrowed(&[], &[CellId(10)]);
        assert!(child.allows_area(AreaId(5)));
        assert!(!child.allows_area(AreaId(6)));
        assert!(child.allows_cell(CellId(10)));
        assert!(!child.allows_cell(CellId(9)));
    }

    #[test]
    fn area_scope_is_distinct_from_plain_restriction() {
        let owned = SpawnLocation::area(RegionId(1), AreaId(4));
        let plain = SpawnLocation::restricted(RegionId(1), &[AreaId(4)], &[]);
        assert_eq!(owned.owner_area(), Some(AreaId(4)));
        assert_ne!(owned, plain);
    }
}
