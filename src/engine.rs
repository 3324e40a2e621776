use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::boundary::RequesterHooks;
use crate::catalog::PopulationCatalog;
use crate::error::PopulationError;
use crate::ids::{MetaStateRef, MissionRef, RegionId, SpawnEventId};
use crate::manager::{DrainReport, PopulationManager};
use crate::policies::PopulationTuning;
use crate::rng::RngManager;
use crate::scenario::{Scenario, ScenarioRegion};
use crate::snapshot::{RegionSnapshot, SnapshotWriter};
use crate::spawn::{RespawnPolicy, RetiredEvent, SpawnEvent, SpawnPolicy};
use crate::world::RegionWorld;

pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    pub tick_ms: u64,
    pub snapshot_interval_ticks: u64,
    pub snapshot_dir: PathBuf,
}

impl EngineSettings {
    pub fn from_scenario(scenario: &Scenario, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            scenario_name: scenario.name.clone(),
            seed: scenario.seed,
            tick_ms: scenario.tick_ms,
            snapshot_interval_ticks: scenario.snapshot_interval_ticks,
            snapshot_dir: snapshot_dir.into(),
        }
    }
}

/// Requester notifications received by one region, with the clock value
/// at which each arrived.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequesterLog {
    pub missions_spawned: Vec<(MissionRef, Duration)>,
    pub meta_states_spawned: Vec<(MetaStateRef, Duration)>,
    pub mission_updates: u64,
    #[serde(skip)]
    now: Duration,
}

impl RequesterHooks for RequesterLog {
    fn mission_population_spawned(&mut self, mission: MissionRef) {
        info!(%mission, "mission population spawned");
        self.missions_spawned.push((mission, self.now));
    }

    fn mission_update_simulation(&mut self, _mission: MissionRef, _event: &SpawnEvent) {
        self.mission_updates += 1;
    }

    fn meta_state_population_spawned(&mut self, meta_state: MetaStateRef) {
        info!(%meta_state, "meta-state population spawned");
        self.meta_states_spawned.push((meta_state, self.now));
    }
}

/// One region's population manager, simulated world and requester log.
pub struct RegionSimulation {
    world: RegionWorld,
    manager: PopulationManager,
    hooks: RequesterLog,
}

impl RegionSimulation {
    pub fn new(world: RegionWorld, rng: ChaCha8Rng, tuning: PopulationTuning) -> Self {
        let manager = PopulationManager::new(world.region(), rng, tuning);
        Self {
            world,
            manager,
            hooks: RequesterLog::default(),
        }
    }

    /// Builds a region from its scenario entry and schedules the population
    /// of its areas, hosted missions and meta-states.
    pub fn activate(
        scenario: &Scenario,
        region: &ScenarioRegion,
        catalog: &PopulationCatalog,
        rng: ChaCha8Rng,
    ) -> Result<Self, PopulationError> {
        let mut sim = Self::new(region.build_world(), rng, scenario.tuning.clone());
        let world = &sim.world;
        let manager = &mut sim.manager;
        let now = Duration::ZERO;

        for area in &region.areas {
            let Some(population_id) = area.population else {
                continue;
            };
            let population = match catalog.population(population_id) {
                Ok(population) => population,
                Err(err) => {
                    warn!(region = %region.id, area = %area.id, error = %err, "skipping area population");
                    continue;
                }
            };
            let event = manager.add_spawn_event(SpawnPolicy::Area { area: area.id });
            if let Some(delay_ms) = area.respawn_delay_ms {
                if let Some(spawn_event) = manager.event_mut(event) {
                    spawn_event.respawn = RespawnPolicy {
                        enabled: true,
                        delay: Duration::from_millis(delay_ms),
                    };
                }
            }
            let summary =
                manager.populate_area(event, world, world, catalog, area.id, population, now)?;
            debug!(region = %region.id, area = %area.id, scheduled = summary.scheduled(), "activated area");
        }

        for mission_ref in &region.missions {
            let Some(mission) = scenario.mission(*mission_ref) else {
                warn!(region = %region.id, mission = %mission_ref, "hosted mission is not defined");
                continue;
            };
            let event = manager.add_spawn_event(SpawnPolicy::Mission {
                mission: mission.id,
                region_authoritative: true,
            });
            manager.register_mission(event, world, world, catalog, mission, now)?;
        }

        for meta_ref in &region.meta_states {
            let Some(meta_state) = scenario.meta_state(*meta_ref) else {
                warn!(region = %region.id, meta_state = %meta_ref, "hosted meta-state is not defined");
                continue;
            };
            let event = manager.add_spawn_event(SpawnPolicy::MetaState {
                meta_state: meta_state.id,
            });
            let location = meta_state.location(region.id);
            manager.add_meta_state_objects(event, world, world, catalog, meta_state, &location, now)?;
        }
        Ok(sim)
    }

    pub fn region(&self) -> RegionId {
        self.world.region()
    }

    pub fn world(&self) -> &RegionWorld {
        &self.world
    }

    pub fn manager(&self) -> &PopulationManager {
        &self.manager
    }

    pub fn requester_log(&self) -> &RequesterLog {
        &self.hooks
    }

    pub fn tick(&mut self, now: Duration) -> DrainReport {
        self.hooks.now = now;
        self.manager
            .drain_due_work(now, &mut self.world, &mut self.hooks)
    }

    pub fn request_respawn(&mut self, event: SpawnEventId, now: Duration) -> Result<bool, PopulationError> {
        self.manager.request_respawn(event, now)
    }

    pub fn retire_event(&mut self, event: SpawnEventId) -> Result<RetiredEvent, PopulationError> {
        self.manager.retire_event(event, &mut self.world)
    }

    pub fn snapshot(&self) -> RegionSnapshot {
        RegionSnapshot::capture(&self.manager, &self.world)
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    regions: Vec<RegionSimulation>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            regions: Vec::new(),
        }
    }

    /// Activates every region a scenario declares, each with its own stream.
    pub fn from_scenario(scenario: &Scenario, settings: EngineSettings) -> Result<Self> {
        let rng = RngManager::new(settings.seed);
        let catalog = scenario.build_catalog();
        let mut builder = Self::new(settings);
        for region in &scenario.regions {
            let sim = RegionSimulation::activate(scenario, region, &catalog, rng.region_rng(region.id))
                .with_context(|| format!("Failed to activate {}", region.id))?;
            builder.push_region(sim);
        }
        Ok(builder)
    }

    pub fn with_region(mut self, region: RegionSimulation) -> Self {
        self.regions.push(region);
        self
    }

    pub fn push_region(&mut self, region: RegionSimulation) {
        self.regions.push(region);
    }

    pub fn build(self) -> Engine {
        Engine {
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_ticks,
            ),
            regions: self.regions,
            settings: self.settings,
            tick: 0,
            now: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub tick: u64,
    pub now: Duration,
    pub spawned: usize,
    pub failed: usize,
    pub dropped: usize,
    pub completed: Vec<(RegionId, SpawnEventId)>,
    pub pending: usize,
    pub snapshot_path: Option<PathBuf>,
}

pub struct Engine {
    settings: EngineSettings,
    regions: Vec<RegionSimulation>,
    snapshot_writer: SnapshotWriter,
    tick: u64,
    now: Duration,
}

impl Engine {
    pub fn run(&mut self, ticks: u64) -> Result<()> {
        self.run_with_hook(ticks, |_| {})
    }

    pub fn run_with_hook<F>(&mut self, ticks: u64, mut hook: F) -> Result<()>
    where
        F: FnMut(&TickSummary),
    {
        for _ in 0..ticks {
            let summary = self.step()?;
            hook(&summary);
        }
        Ok(())
    }

    /// Advances the clock by one tick and drains every region.
    pub fn step(&mut self) -> Result<TickSummary> {
        self.tick += 1;
        self.now += Duration::from_millis(self.settings.tick_ms);
        let mut summary = TickSummary {
            tick: self.tick,
            now: self.now,
            ..TickSummary::default()
        };

        for region in &mut self.regions {
            let report = region.tick(self.now);
            summary.spawned += report.outcome.spawned;
            summary.failed += report.outcome.failed;
            summary.dropped += report.outcome.dropped;
            summary
                .completed
                .extend(report.completed.iter().map(|event| (region.region(), *event)));
            summary.pending += region
                .manager()
                .events()
                .map(SpawnEvent::pending_count)
                .sum::<usize>();
        }

        if self.snapshot_writer.should_write(self.tick) {
            let snapshots: Vec<RegionSnapshot> =
                self.regions.iter().map(RegionSimulation::snapshot).collect();
            summary.snapshot_path = self.snapshot_writer.maybe_write(
                self.tick,
                self.now.as_millis() as u64,
                &self.settings.scenario_name,
                &snapshots,
            )?;
        }
        Ok(summary)
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn scenario_name(&self) -> &str {
        &self.settings.scenario_name
    }

    pub fn regions(&self) -> &[RegionSimulation] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&RegionSimulation> {
        self.regions.iter().find(|region| region.region() == id)
    }

    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut RegionSimulation> {
        self.regions.iter_mut().find(|region| region.region() == id)
    }

    pub fn live_entity_count(&self) -> usize {
        self.regions
            .iter()
            .map(|region| region.world().live_entity_count())
            .sum()
    }

    /// True once every event in every region has drained.
    pub fn is_spawned(&self) -> bool {
        self.regions.iter().all(|region| region.manager().is_spawned())
    }
}
