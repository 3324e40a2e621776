//! Contracts with the systems around the scheduler: spatial queries,
//! marker capacity, entity lifecycle and requester notifications.

use serde::Serialize;

use crate::catalog::PopulationObjectTemplate;
use crate::error::PopulationError;
use crate::ids::{
    AreaId, DifficultyTier, EntityId, GroupId, MarkerRef, MetaStateRef, MissionRef,
    PopulationObjectId, RegionId, SpawnEventId,
};
use crate::location::SpawnLocation;
use crate::spawn::{PropertyOverrides, SpawnEvent, SpawnTarget};

pub trait RegionView {
    fn region_id(&self) -> RegionId;
    fn difficulty_tier(&self) -> DifficultyTier;
    fn has_area(&self, area: AreaId) -> bool;
    /// Navigable area available for spawning inside the location's scope.
    fn spawnable_area(&self, location: &SpawnLocation) -> f32;
}

pub trait MarkerRegistry {
    fn free_slots(&self, marker: MarkerRef, area: AreaId) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpawnFlags {
    /// Spawn even if the target cell is not currently simulated.
    pub ignore_simulated: bool,
}

impl Default for SpawnFlags {
    fn default() -> Self {
        Self {
            ignore_simulated: true,
        }
    }
}

/// Instruction handed to the entity system for one population object.
#[derive(Debug, Clone, Copy)]
pub struct SpawnOrder<'a> {
    pub event: SpawnEventId,
    pub object: PopulationObjectId,
    pub template: &'a PopulationObjectTemplate,
    pub target: &'a SpawnTarget,
    pub properties: Option<&'a PropertyOverrides>,
    pub critical: bool,
    pub flags: SpawnFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealizedSpawn {
    pub group: GroupId,
    pub entities: Vec<EntityId>,
}

pub trait EntityLifecycle {
    fn materialize(&mut self, order: &SpawnOrder<'_>) -> Result<RealizedSpawn, PopulationError>;

    /// Respawns the members of a group in place. Returns `false` when the
    /// group is no longer known.
    fn respawn_group(&mut self, group: GroupId) -> bool;

    fn release(&mut self, groups: &[GroupId], entities: &[EntityId]);
}

/// Notifications delivered to the systems that requested population.
pub trait RequesterHooks {
    fn mission_population_spawned(&mut self, _mission: MissionRef) {}

    fn mission_update_simulation(&mut self, _mission: MissionRef, _event: &SpawnEvent) {}

    fn meta_state_population_spawned(&mut self, _meta_state: MetaStateRef) {}
}

pub struct NoHooks;

impl RequesterHooks for NoHooks {}
