//! In-memory region used by the engine: spatial queries, marker
//! reservations and a minimal entity lifecycle.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boundary::{EntityLifecycle, MarkerRegistry, RealizedSpawn, RegionView, SpawnOrder};
use crate::error::PopulationError;
use crate::ids::{
    AreaId, CellId, DifficultyTier, EntityId, GroupId, MarkerRef, MissionRef, PrototypeId,
    RegionId, SpawnEventId,
};
use crate::location::SpawnLocation;
use crate::spawn::SpawnTarget;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaState {
    pub id: AreaId,
    pub spawnable_area: f32,
    #[serde(default)]
    pub cells: BTreeSet<CellId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkerSlots {
    pub capacity: u32,
    pub reserved: u32,
}

impl MarkerSlots {
    pub fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.reserved)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpawnGroup {
    pub id: GroupId,
    pub event: SpawnEventId,
    pub template: PrototypeId,
    pub entities: Vec<EntityId>,
    pub reservation: Option<(MarkerRef, AreaId)>,
    pub mission: Option<MissionRef>,
    pub respawns: u32,
}

#[derive(Debug, Clone)]
pub struct RegionWorld {
    region: RegionId,
    tier: DifficultyTier,
    areas: BTreeMap<AreaId, AreaState>,
    markers: BTreeMap<(MarkerRef, AreaId), MarkerSlots>,
    groups: BTreeMap<GroupId, SpawnGroup>,
    live_entities: BTreeSet<EntityId>,
    blocked_templates: BTreeSet<PrototypeId>,
    next_group: u64,
    next_entity: u64,
}

impl RegionWorld {
    pub fn new(region: RegionId, tier: DifficultyTier) -> Self {
        Self {
            region,
            tier,
            areas: BTreeMap::new(),
            markers: BTreeMap::new(),
            groups: BTreeMap::new(),
            live_entities: BTreeSet::new(),
            blocked_templates: BTreeSet::new(),
            next_group: 1,
            next_entity: 1,
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn add_area(&mut self, id: AreaId, spawnable_area: f32, cells: &[CellId]) {
        self.areas.insert(
            id,
            AreaState {
                id,
                spawnable_area,
                cells: cells.iter().copied().collect(),
            },
        );
    }

    pub fn add_marker(&mut self, marker: MarkerRef, area: AreaId, capacity: u32) {
        self.markers.insert(
            (marker, area),
            MarkerSlots {
                capacity,
                reserved: 0,
            },
        );
    }

    pub fn marker_slots(&self, marker: MarkerRef, area: AreaId) -> Option<MarkerSlots> {
        self.markers.get(&(marker, area)).copied()
    }

    /// Makes every spawn of `template` fail until unblocked.
    pub fn block_template(&mut self, template: PrototypeId) {
        self.blocked_templates.insert(template);
    }

    pub fn unblock_template(&mut self, template: PrototypeId) {
        self.blocked_templates.remove(&template);
    }

    pub fn areas(&self) -> impl Iterator<Item = &AreaState> {
        self.areas.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &SpawnGroup> {
        self.groups.values()
    }

    pub fn group(&self, id: GroupId) -> Option<&SpawnGroup> {
        self.groups.get(&id)
    }

    pub fn live_entity_count(&self) -> usize {
        self.live_entities.len()
    }

    fn area_share(&self, area: &AreaState, location: &SpawnLocation) -> f32 {
        if location.cells().is_empty() || area.cells.is_empty() {
            return area.spawnable_area;
        }
        let allowed = area
            .cells
            .iter()
            .filter(|cell| location.allows_cell(**cell))
            .count();
        area.spawnable_area * allowed as f32 / area.cells.len() as f32
    }

    fn reserve_marker(
        &mut self,
        marker: MarkerRef,
        location: &SpawnLocation,
    ) -> Result<AreaId, PopulationError> {
        let candidates: Vec<AreaId> = match location.owner_area() {
            Some(area) => vec![area],
            None => self
                .areas
                .keys()
                .copied()
                .filter(|area| location.allows_area(*area))
                .collect(),
        };
        for area in &candidates {
            if let Some(slots) = self.markers.get_mut(&(marker, *area)) {
                if slots.free() > 0 {
                    slots.reserved += 1;
                    return Ok(*area);
                }
            }
        }
        let area = candidates.first().copied().unwrap_or(AreaId(0));
        Err(PopulationError::CapacityExhausted { marker, area })
    }

    fn allocate_entity(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        self.live_entities.insert(id);
        id
    }
}

impl RegionView for RegionWorld {
    fn region_id(&self) -> RegionId {
        self.region
    }

    fn difficulty_tier(&self) -> DifficultyTier {
        self.tier
    }

    fn has_area(&self, area: AreaId) -> bool {
        self.areas.contains_key(&area)
    }

    fn spawnable_area(&self, location: &SpawnLocation) -> f32 {
        if location.region_id() != self.region {
            return 0.0;
        }
        self.areas
            .values()
            .filter(|area| location.allows_area(area.id))
            .map(|area| self.area_share(area, location))
            .sum()
    }
}

impl MarkerRegistry for RegionWorld {
    fn free_slots(&self, marker: MarkerRef, area: AreaId) -> u32 {
        self.markers
            .get(&(marker, area))
            .map_or(0, MarkerSlots::free)
    }
}

impl EntityLifecycle for RegionWorld {
    fn materialize(&mut self, order: &SpawnOrder<'_>) -> Result<RealizedSpawn, PopulationError> {
        let template = order.template;
        if self.blocked_templates.contains(&template.id) {
            return Err(PopulationError::MaterializationFailure {
                object: order.object,
                reason: format!("{} is blocked", template.id),
            });
        }
        if template.entities.is_empty() {
            return Err(PopulationError::MaterializationFailure {
                object: order.object,
                reason: format!("{} has no entities", template.id),
            });
        }

        let reservation = match order.target {
            SpawnTarget::Marker { marker, location } => {
                Some((*marker, self.reserve_marker(*marker, location)?))
            }
            SpawnTarget::Location(_) => None,
        };

        let group = GroupId(self.next_group);
        self.next_group += 1;
        let entities: Vec<EntityId> = template
            .entities
            .iter()
            .map(|_| self.allocate_entity())
            .collect();
        self.groups.insert(
            group,
            SpawnGroup {
                id: group,
                event: order.event,
                template: template.id,
                entities: entities.clone(),
                reservation,
                mission: order.properties.and_then(|properties| properties.mission),
                respawns: 0,
            },
        );
        debug!(%group, template = %template.id, entities = entities.len(), "materialized spawn group");
        Ok(RealizedSpawn { group, entities })
    }

    fn respawn_group(&mut self, group: GroupId) -> bool {
        match self.groups.get_mut(&group) {
            Some(spawn_group) => {
                spawn_group.respawns += 1;
                true
            }
            None => false,
        }
    }

    fn release(&mut self, groups: &[GroupId], entities: &[EntityId]) {
        for id in groups {
            let Some(group) = self.groups.remove(id) else {
                continue;
            };
            if let Some(key) = group.reservation {
                if let Some(slots) = self.markers.get_mut(&key) {
                    slots.reserved = slots.reserved.saturating_sub(1);
                }
            }
            for entity in &group.entities {
                self.live_entities.remove(entity);
            }
        }
        for entity in entities {
            self.live_entities.remove(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::SpawnFlags;
    use crate::catalog::PopulationObjectTemplate;
    use crate::ids::PopulationObjectId;

    fn template(entities: usize) -> PopulationObjectTemplate {
        PopulationObjectTemplate {
            id: PrototypeId(3),
            name: "pack".into(),
            marker: Some(MarkerRef(1)),
            average_size: 1.0,
            entities: (0..entities as u64).map(PrototypeId).collect(),
        }
    }

    fn order<'a>(template: &'a PopulationObjectTemplate, target: &'a SpawnTarget) -> SpawnOrder<'a> {
        SpawnOrder {
            event: SpawnEventId(1),
            object: PopulationObjectId(1),
            template,
            target,
            properties: None,
            critical: false,
            flags: SpawnFlags::default(),
        }
    }

    #[test]
    fn spawnable_area_respects_cell_restriction() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AreaId(1), 100.0, &[CellId(1), CellId(2), CellId(3), CellId(4)]);
        world.add_area(AreaId(2), 50.0, &[]);

        assert_eq!(world.spawnable_area(&SpawnLocation::region(RegionId(1))), 150.0);
        let cells = SpawnLocation::restricted(RegionId(1), &[AreaId(1)], &[CellId(1)]);
        assert_eq!(world.spawnable_area(&cells), 25.0);
        assert_eq!(world.spawnable_area(&SpawnLocation::region(RegionId(9))), 0.0);
    }

    #[test]
    fn marker_spawns_reserve_and_release_slots() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AreaId(1), 100.0, &[]);
        world.add_marker(MarkerRef(1), AreaId(1), 1);
        let template = template(2);
        let target = SpawnTarget::Marker {
            marker: MarkerRef(1),
            location: SpawnLocation::area(RegionId(1), AreaId(1)),
        };

        let spawn = world.materialize(&order(&template, &target)).unwrap();
        assert_eq!(spawn.entities.len(), 2);
        assert_eq!(world.free_slots(MarkerRef(1), AreaId(1)), 0);
        assert!(matches!(
            world.materialize(&order(&template, &target)),
            Err(PopulationError::CapacityExhausted { .. })
        ));

        world.release(&[spawn.group], &[]);
        assert_eq!(world.free_slots(MarkerRef(1), AreaId(1)), 1);
        assert_eq!(world.live_entity_count(), 0);
    }

    #[test]
    fn blocked_templates_fail_and_respawn_counts() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        let template = template(1);
        let target = SpawnTarget::Location(SpawnLocation::region(RegionId(1)));
        world.block_template(template.id);
        assert!(world.materialize(&order(&template, &target)).is_err());
        world.unblock_template(template.id);

        let spawn = world.materialize(&order(&template, &target)).unwrap();
        assert!(world.respawn_group(spawn.group));
        assert!(!world.respawn_group(GroupId(999)));
        assert_eq!(world.group(spawn.group).map(|g| g.respawns), Some(1));
    }
}
