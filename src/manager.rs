//! Per-region registry of spawn events and the per-tick scheduling pass.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::boundary::{EntityLifecycle, MarkerRegistry, RegionView, RequesterHooks};
use crate::catalog::{AreaPopulation, PopulationCatalog};
use crate::error::PopulationError;
use crate::ids::{AreaId, GroupId, RegionId, SpawnEventId};
use crate::location::SpawnLocation;
use crate::policies::{
    self, AreaPopulationSummary, GenerationContext, MetaStateDefinition, MissionDefinition,
    PopulationTuning,
};
use crate::spawn::{DrainOutcome, RetiredEvent, SpawnEvent, SpawnPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Events that became fully spawned during this pass.
    pub completed: Vec<SpawnEventId>,
    pub respawned_groups: Vec<GroupId>,
}

pub struct PopulationManager {
    region: RegionId,
    rng: ChaCha8Rng,
    tuning: PopulationTuning,
    events: BTreeMap<SpawnEventId, SpawnEvent>,
    group_owners: HashMap<GroupId, SpawnEventId>,
    pending_respawns: BTreeMap<SpawnEventId, Duration>,
    next_event: u64,
}

impl PopulationManager {
    pub fn new(region: RegionId, rng: ChaCha8Rng, tuning: PopulationTuning) -> Self {
        Self {
            region,
            rng,
            tuning,
            events: BTreeMap::new(),
            group_owners: HashMap::new(),
            pending_respawns: BTreeMap::new(),
            next_event: 1,
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn tuning(&self) -> &PopulationTuning {
        &self.tuning
    }

    pub fn add_spawn_event(&mut self, policy: SpawnPolicy) -> SpawnEventId {
        let id = SpawnEventId(self.next_event);
        self.next_event += 1;
        self.events.insert(id, SpawnEvent::new(id, self.region, policy));
        debug!(region = %self.region, event = %id, ?policy, "registered spawn event");
        id
    }

    pub fn event(&self, id: SpawnEventId) -> Option<&SpawnEvent> {
        self.events.get(&id)
    }

    pub fn event_mut(&mut self, id: SpawnEventId) -> Option<&mut SpawnEvent> {
        self.events.get_mut(&id)
    }

    pub fn events(&self) -> impl Iterator<Item = &SpawnEvent> {
        self.events.values()
    }

    pub fn event_for_group(&self, group: GroupId) -> Option<SpawnEventId> {
        self.group_owners.get(&group).copied()
    }

    /// True when every registered event has drained its schedulers.
    pub fn is_spawned(&self) -> bool {
        self.events.values().all(SpawnEvent::is_spawned)
    }

    pub fn populate_area(
        &mut self,
        id: SpawnEventId,
        region: &dyn RegionView,
        markers: &dyn MarkerRegistry,
        catalog: &PopulationCatalog,
        area: AreaId,
        population: &AreaPopulation,
        now: Duration,
    ) -> Result<AreaPopulationSummary, PopulationError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(PopulationError::UnknownSpawnEvent(id))?;
        let mut ctx = GenerationContext {
            region,
            markers,
            catalog,
            tuning: &self.tuning,
            rng: &mut self.rng,
            now,
        };
        Ok(policies::populate_area(event, &mut ctx, area, population))
    }

    pub fn register_mission(
        &mut self,
        id: SpawnEventId,
        region: &dyn RegionView,
        markers: &dyn MarkerRegistry,
        catalog: &PopulationCatalog,
        mission: &MissionDefinition,
        now: Duration,
    ) -> Result<usize, PopulationError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(PopulationError::UnknownSpawnEvent(id))?;
        let mut ctx = GenerationContext {
            region,
            markers,
            catalog,
            tuning: &self.tuning,
            rng: &mut self.rng,
            now,
        };
        Ok(policies::register_mission_population(event, &mut ctx, mission))
    }

    pub fn add_meta_state_objects(
        &mut self,
        id: SpawnEventId,
        region: &dyn RegionView,
        markers: &dyn MarkerRegistry,
        catalog: &PopulationCatalog,
        meta_state: &MetaStateDefinition,
        location: &SpawnLocation,
        now: Duration,
    ) -> Result<usize, PopulationError> {
        let event = self
            .events
            .get_mut(&id)
            .ok_or(PopulationError::UnknownSpawnEvent(id))?;
        let mut ctx = GenerationContext {
            region,
            markers,
            catalog,
            tuning: &self.tuning,
            rng: &mut self.rng,
            now,
        };
        Ok(policies::add_required_objects(
            event,
            &mut ctx,
            &meta_state.required_objects,
            location,
            meta_state.remove_on_spawn_fail,
        ))
    }

    /// The per-tick sweep: materializes due work across every event, fires
    /// completion hooks on the tick an event drains, then runs due respawns.
    pub fn drain_due_work(
        &mut self,
        now: Duration,
        lifecycle: &mut dyn EntityLifecycle,
        hooks: &mut dyn RequesterHooks,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        let mut budget = self.tuning.spawn_budget();
        let retry_delay = self.tuning.retry_delay();

        for (id, event) in self.events.iter_mut() {
            let outcome = event.drain_due(now, &mut budget, lifecycle, retry_delay);
            report.outcome.absorb(outcome);
            for group in event.spawn_groups() {
                self.group_owners.entry(*group).or_insert(*id);
            }
            if event.update_completion() {
                info!(region = %self.region, event = %id, groups = event.spawn_groups().len(), "spawn event fully populated");
                event.on_spawned_population(hooks);
                report.completed.push(*id);
            }
            event.on_update_simulation(hooks);
        }

        let due: Vec<SpawnEventId> = self
            .pending_respawns
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in due {
            self.pending_respawns.remove(&id);
            if let Some(event) = self.events.get_mut(&id) {
                report.respawned_groups.extend(event.respawn(lifecycle));
            }
        }
        report
    }

    /// Queues a respawn honoring the event's respawn policy. Repeated
    /// requests before it runs are merged. Returns false when the policy
    /// disallows respawning.
    pub fn request_respawn(&mut self, id: SpawnEventId, now: Duration) -> Result<bool, PopulationError> {
        let event = self
            .events
            .get(&id)
            .ok_or(PopulationError::UnknownSpawnEvent(id))?;
        if !event.respawn.enabled {
            return Ok(false);
        }
        let at = now + event.respawn.delay;
        self.pending_respawns.entry(id).or_insert(at);
        Ok(true)
    }

    /// Removes an event, dropping its pending work without completion and
    /// releasing what it spawned through the lifecycle boundary.
    pub fn retire_event(
        &mut self,
        id: SpawnEventId,
        lifecycle: &mut dyn EntityLifecycle,
    ) -> Result<RetiredEvent, PopulationError> {
        let mut event = self
            .events
            .remove(&id)
            .ok_or(PopulationError::UnknownSpawnEvent(id))?;
        self.pending_respawns.remove(&id);
        let retired = event.retire();
        for group in &retired.groups {
            self.group_owners.remove(group);
        }
        lifecycle.release(&retired.groups, &retired.entities);
        debug!(
            region = %self.region,
            event = %id,
            dropped = retired.dropped,
            groups = retired.groups.len(),
            "retired spawn event"
        );
        Ok(retired)
    }
}
