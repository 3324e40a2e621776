use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::boundary::{EntityLifecycle, RequesterHooks, SpawnFlags, SpawnOrder};
use crate::error::PopulationError;
use crate::ids::{
    AreaId, EntityId, GroupId, MarkerRef, MetaStateRef, MissionRef, PopulationObjectId, RegionId,
    SpawnEventId,
};
use crate::location::SpawnLocation;

use super::object::{PopulationObject, PopulationRequest, SchedulerKey};
use super::scheduler::SpawnScheduler;

/// Who requested the population, and therefore how completion is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpawnPolicy {
    Area {
        area: AreaId,
    },
    Mission {
        mission: MissionRef,
        /// Only the region-level mission manager reports completion.
        region_authoritative: bool,
    },
    MetaState {
        meta_state: MetaStateRef,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnEventState {
    Pending,
    Spawned,
    Respawning,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RespawnPolicy {
    pub enabled: bool,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainOutcome {
    pub spawned: usize,
    pub failed: usize,
    pub dropped: usize,
}

impl DrainOutcome {
    pub fn absorb(&mut self, other: DrainOutcome) {
        self.spawned += other.spawned;
        self.failed += other.failed;
        self.dropped += other.dropped;
    }
}

/// Everything an event still referenced when it was retired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetiredEvent {
    pub groups: Vec<GroupId>,
    pub entities: Vec<EntityId>,
    pub dropped: usize,
}

#[derive(Debug)]
pub struct SpawnEvent {
    id: SpawnEventId,
    region: RegionId,
    policy: SpawnPolicy,
    state: SpawnEventState,
    pub respawn: RespawnPolicy,
    spawn_groups: BTreeSet<GroupId>,
    spawned_entities: BTreeSet<EntityId>,
    marker_schedulers: BTreeMap<MarkerRef, SpawnScheduler>,
    location_schedulers: BTreeMap<SpawnLocation, SpawnScheduler>,
    next_object: u64,
    failures: u64,
}

impl SpawnEvent {
    pub fn new(id: SpawnEventId, region: RegionId, policy: SpawnPolicy) -> Self {
        Self {
            id,
            region,
            policy,
            state: SpawnEventState::Pending,
            respawn: RespawnPolicy::default(),
            spawn_groups: BTreeSet::new(),
            spawned_entities: BTreeSet::new(),
            marker_schedulers: BTreeMap::new(),
            location_schedulers: BTreeMap::new(),
            next_object: 0,
            failures: 0,
        }
    }

    pub fn id(&self) -> SpawnEventId {
        self.id
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn policy(&self) -> SpawnPolicy {
        self.policy
    }

    pub fn state(&self) -> SpawnEventState {
        self.state
    }

    pub fn spawn_groups(&self) -> &BTreeSet<GroupId> {
        &self.spawn_groups
    }

    pub fn spawned_entities(&self) -> &BTreeSet<EntityId> {
        &self.spawned_entities
    }

    /// Materialization failures recorded so far, including retried debt.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Builds a population object, files it under the scheduler for its
    /// marker or location and returns it.
    pub fn add_population_object(
        &mut self,
        now: Duration,
        request: PopulationRequest,
    ) -> Result<&PopulationObject, PopulationError> {
        if self.state == SpawnEventState::Retired {
            return Err(PopulationError::EventRetired(self.id));
        }
        let id = PopulationObjectId(self.next_object);
        self.next_object += 1;
        self.state = SpawnEventState::Pending;

        let object = PopulationObject::from_request(id, self.id, now, request);
        let scheduler = match object.scheduler_key() {
            SchedulerKey::Marker(marker) => self
                .marker_schedulers
                .entry(marker)
                .or_insert_with(|| SpawnScheduler::new(SchedulerKey::Marker(marker))),
            SchedulerKey::Location(location) => self
                .location_schedulers
                .entry(location.clone())
                .or_insert_with(|| SpawnScheduler::new(SchedulerKey::Location(location))),
        };
        Ok(scheduler.push(object))
    }

    pub fn marker_scheduler(&self, marker: MarkerRef) -> Option<&SpawnScheduler> {
        self.marker_schedulers.get(&marker)
    }

    pub fn location_scheduler(&self, location: &SpawnLocation) -> Option<&SpawnScheduler> {
        self.location_schedulers.get(location)
    }

    pub fn schedulers(&self) -> impl Iterator<Item = &SpawnScheduler> {
        self.marker_schedulers
            .values()
            .chain(self.location_schedulers.values())
    }

    pub fn scheduler_count(&self) -> usize {
        self.marker_schedulers.len() + self.location_schedulers.len()
    }

    pub fn pending_objects(&self) -> impl Iterator<Item = &PopulationObject> {
        self.schedulers().flat_map(|scheduler| scheduler.pending())
    }

    pub fn pending_count(&self) -> usize {
        self.schedulers().map(SpawnScheduler::len).sum()
    }

    pub fn critical_pending(&self) -> usize {
        self.pending_objects().filter(|object| object.critical).count()
    }

    /// True when no owned scheduler holds pending work.
    pub fn is_spawned(&self) -> bool {
        self.schedulers().all(|scheduler| !scheduler.any())
    }

    pub fn register_realized_spawn(&mut self, group: GroupId, entities: &[EntityId]) {
        self.spawn_groups.insert(group);
        self.spawned_entities.extend(entities.iter().copied());
    }

    /// Hands every due object to the entity system, at most `budget` of them.
    pub fn drain_due(
        &mut self,
        now: Duration,
        budget: &mut usize,
        lifecycle: &mut dyn EntityLifecycle,
        retry_delay: Duration,
    ) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        let mut realized = Vec::new();
        let schedulers = self
            .marker_schedulers
            .values_mut()
            .chain(self.location_schedulers.values_mut());

        for scheduler in schedulers {
            if *budget == 0 {
                break;
            }
            let due = scheduler.take_due(now, *budget);
            *budget -= due.len();
            for mut object in due {
                let order = SpawnOrder {
                    event: self.id,
                    object: object.id,
                    template: &object.template,
                    target: &object.target,
                    properties: object.properties.as_ref(),
                    critical: object.critical,
                    flags: SpawnFlags::default(),
                };
                match lifecycle.materialize(&order) {
                    Ok(spawn) => {
                        outcome.spawned += 1;
                        realized.push(spawn);
                    }
                    Err(err) if object.remove_on_fail => {
                        debug!(event = %self.id, object = %object.id, error = %err, "dropping population object after failed spawn");
                        self.failures += 1;
                        outcome.dropped += 1;
                    }
                    Err(err) => {
                        warn!(
                            event = %self.id,
                            object = %object.id,
                            attempts = object.failed_attempts + 1,
                            error = %err,
                            "population object failed to spawn, keeping it pending"
                        );
                        self.failures += 1;
                        object.failed_attempts += 1;
                        object.due = now + retry_delay;
                        scheduler.restore(object);
                        outcome.failed += 1;
                    }
                }
            }
        }

        for spawn in realized {
            self.register_realized_spawn(spawn.group, &spawn.entities);
        }
        outcome
    }

    /// Moves `Pending` to `Spawned` once all schedulers are drained. Returns
    /// true on the transition.
    pub fn update_completion(&mut self) -> bool {
        if self.state == SpawnEventState::Pending && self.is_spawned() {
            self.state = SpawnEventState::Spawned;
            return true;
        }
        false
    }

    /// Asks the entity system to respawn every group this event produced.
    pub fn respawn(&mut self, lifecycle: &mut dyn EntityLifecycle) -> Vec<GroupId> {
        if self.state == SpawnEventState::Retired {
            return Vec::new();
        }
        self.state = SpawnEventState::Respawning;
        let mut requested = Vec::with_capacity(self.spawn_groups.len());
        for group in &self.spawn_groups {
            if !lifecycle.respawn_group(*group) {
                debug!(event = %self.id, group = %group, "respawn requested for unknown group");
            }
            requested.push(*group);
        }
        requested
    }

    pub fn on_spawned_population(&self, hooks: &mut dyn RequesterHooks) {
        match self.policy {
            SpawnPolicy::Area { .. } => {}
            SpawnPolicy::Mission {
                mission,
                region_authoritative,
            } => {
                if region_authoritative && self.is_spawned() {
                    hooks.mission_population_spawned(mission);
                }
            }
            SpawnPolicy::MetaState { meta_state } => {
                hooks.meta_state_population_spawned(meta_state);
            }
        }
    }

    pub fn on_update_simulation(&self, hooks: &mut dyn RequesterHooks) {
        if let SpawnPolicy::Mission { mission, .. } = self.policy {
            hooks.mission_update_simulation(mission, self);
        }
    }

    /// Drops all unmaterialized objects without reporting completion.
    pub fn retire(&mut self) -> RetiredEvent {
        let dropped: usize = self
            .marker_schedulers
            .values_mut()
            .chain(self.location_schedulers.values_mut())
            .map(SpawnScheduler::clear)
            .sum();
        self.state = SpawnEventState::Retired;
        RetiredEvent {
            groups: std::mem::take(&mut self.spawn_groups).into_iter().collect(),
            entities: std::mem::take(&mut self.spawned_entities)
                .into_iter()
                .collect(),
            dropped,
        }
    }
}
