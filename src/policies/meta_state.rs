use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ids::{tier_allowed, AreaId, CellId, DifficultyTier, MetaStateRef, PrototypeId, RegionId};
use crate::location::SpawnLocation;
use crate::spawn::{PopulationRequest, SpawnEvent};

use super::GenerationContext;

/// Upper bound (exclusive) of the per-object spawn jitter.
const SPAWN_JITTER_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredObject {
    pub object: PrototypeId,
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub density: f32,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub allowed_tiers: Vec<DifficultyTier>,
    #[serde(default)]
    pub restrict_to_areas: Vec<AreaId>,
    #[serde(default)]
    pub restrict_to_cells: Vec<CellId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaStateDefinition {
    pub id: MetaStateRef,
    #[serde(default)]
    pub restrict_to_areas: Vec<AreaId>,
    #[serde(default)]
    pub restrict_to_cells: Vec<CellId>,
    #[serde(default)]
    pub remove_on_spawn_fail: bool,
    #[serde(default)]
    pub required_objects: Vec<RequiredObject>,
}

impl MetaStateDefinition {
    pub fn location(&self, region: RegionId) -> SpawnLocation {
        SpawnLocation::restricted(region, &self.restrict_to_areas, &self.restrict_to_cells)
    }
}

/// Schedules a meta-state's required objects inside `location`. Each object
/// gets its own random delay so a batch does not pop in at once.
pub fn add_required_objects(
    event: &mut SpawnEvent,
    ctx: &mut GenerationContext<'_>,
    objects: &[RequiredObject],
    location: &SpawnLocation,
    remove_on_fail: bool,
) -> usize {
    let spawnable_area = location.spawnable_area(ctx.region);
    let tier = ctx.region.difficulty_tier();
    let mut scheduled = 0;

    for required in objects {
        if !tier_allowed(&required.allowed_tiers, tier) {
            continue;
        }
        let template = match ctx.catalog.object(required.object) {
            Ok(template) => template,
            Err(err) => {
                warn!(error = %err, "skipping required object");
                continue;
            }
        };

        let mut count = required.count;
        if count <= 0 && required.density > 0.0 {
            if template.average_size <= 0.0 {
                warn!(object = %template.id, "required object density needs a positive footprint");
                continue;
            }
            let derived =
                required.density / template.average_size * (spawnable_area / ctx.tuning.cluster_sq());
            if !derived.is_finite() {
                warn!(
                    object = %template.id,
                    cluster_area = ctx.tuning.cluster_area,
                    "required object density yields no finite count"
                );
                continue;
            }
            count = derived as i32;
        }

        let scoped = location.narrowed(&required.restrict_to_areas, &required.restrict_to_cells);
        for _ in 0..count.max(0) {
            let jitter = Duration::from_millis(ctx.rng.gen_range(0..SPAWN_JITTER_MS));
            let request = PopulationRequest::new(template.clone(), scoped.clone())
                .at_marker(template.marker)
                .critical(required.critical)
                .delayed(jitter)
                .remove_on_fail(remove_on_fail);
            if let Err(err) = event.add_population_object(ctx.now, request) {
                warn!(error = %err, "required object scheduling stopped");
                return scheduled;
            }
            scheduled += 1;
        }
    }
    scheduled
}
