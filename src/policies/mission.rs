use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ids::{tier_allowed, AreaId, CellId, DifficultyTier, MissionRef, PrototypeId};
use crate::location::SpawnLocation;
use crate::spawn::{PopulationRequest, SpawnEvent};

use super::GenerationContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPopulationEntry {
    pub population: PrototypeId,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub allowed_tiers: Vec<DifficultyTier>,
    #[serde(default)]
    pub restrict_to_areas: Vec<AreaId>,
    #[serde(default)]
    pub restrict_to_cells: Vec<CellId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub id: MissionRef,
    #[serde(default)]
    pub open_mission: bool,
    #[serde(default)]
    pub population_required: bool,
    #[serde(default)]
    pub population_spawns: Vec<MissionPopulationEntry>,
}

impl MissionDefinition {
    /// Story missions always need their population; open missions only
    /// when they say so.
    pub fn population_critical(&self) -> bool {
        !self.open_mission || self.population_required
    }
}

/// Schedules the population a mission declares. Returns how many objects
/// were scheduled.
pub fn register_mission_population(
    event: &mut SpawnEvent,
    ctx: &mut GenerationContext<'_>,
    mission: &MissionDefinition,
) -> usize {
    let critical = mission.population_critical();
    let tier = ctx.region.difficulty_tier();
    let mut scheduled = 0;

    for entry in &mission.population_spawns {
        if !tier_allowed(&entry.allowed_tiers, tier) {
            continue;
        }
        if !entry.restrict_to_areas.is_empty()
            && !entry
                .restrict_to_areas
                .iter()
                .any(|area| ctx.region.has_area(*area))
        {
            continue;
        }
        let template = match ctx.catalog.object(entry.population) {
            Ok(template) => template,
            Err(err) => {
                warn!(mission = %mission.id, error = %err, "skipping mission population entry");
                continue;
            }
        };

        let location = SpawnLocation::restricted(
            ctx.region.region_id(),
            &entry.restrict_to_areas,
            &entry.restrict_to_cells,
        );
        for _ in 0..entry.count {
            let request = PopulationRequest::new(template.clone(), location.clone())
                .at_marker(template.marker)
                .critical(critical)
                .for_mission(Some(mission.id));
            if let Err(err) = event.add_population_object(ctx.now, request) {
                warn!(mission = %mission.id, error = %err, "mission population stopped");
                return scheduled;
            }
            scheduled += 1;
        }
    }
    scheduled
}
