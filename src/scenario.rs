use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{AreaPopulation, PopulationCatalog, PopulationList, PopulationObjectTemplate, PopulationTheme};
use crate::ids::{AreaId, CellId, DifficultyTier, MarkerRef, MetaStateRef, MissionRef, PrototypeId, RegionId};
use crate::policies::{MetaStateDefinition, MissionDefinition, PopulationTuning};
use crate::world::RegionWorld;

fn default_tick_ms() -> u64 {
    100
}

fn default_snapshot_interval_ticks() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    /// Simulated time advanced per tick.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub ticks: Option<u64>,
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tuning: PopulationTuning,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub missions: Vec<MissionDefinition>,
    #[serde(default)]
    pub meta_states: Vec<MetaStateDefinition>,
    pub regions: Vec<ScenarioRegion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub objects: Vec<PopulationObjectTemplate>,
    #[serde(default)]
    pub lists: Vec<PopulationList>,
    #[serde(default)]
    pub themes: Vec<PopulationTheme>,
    #[serde(default)]
    pub populations: Vec<AreaPopulation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRegion {
    pub id: RegionId,
    #[serde(default)]
    pub difficulty: DifficultyTier,
    #[serde(default)]
    pub areas: Vec<ScenarioArea>,
    #[serde(default)]
    pub markers: Vec<ScenarioMarker>,
    /// Missions whose population this region hosts.
    #[serde(default)]
    pub missions: Vec<MissionRef>,
    #[serde(default)]
    pub meta_states: Vec<MetaStateRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioArea {
    pub id: AreaId,
    pub spawnable_area: f32,
    #[serde(default)]
    pub cells: Vec<CellId>,
    #[serde(default)]
    pub population: Option<PrototypeId>,
    /// Enables respawning for the area's population after this delay.
    #[serde(default)]
    pub respawn_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioMarker {
    pub marker: MarkerRef,
    pub area: AreaId,
    pub slots: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("scenario declares no regions")]
    NoRegions,
    #[error("tick length must be positive")]
    ZeroTickLength,
    #[error("cluster area must be a positive finite number, got {0}")]
    NonPositiveClusterArea(f32),
    #[error("{0} is declared more than once")]
    DuplicateRegion(RegionId),
    #[error("{area} in {region} is declared more than once")]
    DuplicateArea { region: RegionId, area: AreaId },
    #[error("{area} in {region} references unknown population {population}")]
    UnknownPopulation {
        region: RegionId,
        area: AreaId,
        population: PrototypeId,
    },
    #[error("{marker} in {region} is placed in unknown {area}")]
    MarkerOutsideRegion {
        region: RegionId,
        marker: MarkerRef,
        area: AreaId,
    },
    #[error("{region} hosts undefined {mission}")]
    UnknownMission { region: RegionId, mission: MissionRef },
    #[error("{region} hosts undefined {meta_state}")]
    UnknownMetaState {
        region: RegionId,
        meta_state: MetaStateRef,
    },
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("Invalid scenario {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// Checks cross references. Catalog entries that fail to resolve at
    /// generation time are skipped with a warning instead.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.regions.is_empty() {
            return Err(ScenarioError::NoRegions);
        }
        if self.tick_ms == 0 {
            return Err(ScenarioError::ZeroTickLength);
        }
        let cluster_area = self.tuning.cluster_area;
        if !cluster_area.is_finite() || cluster_area <= 0.0 {
            return Err(ScenarioError::NonPositiveClusterArea(cluster_area));
        }
        let populations: BTreeSet<PrototypeId> =
            self.catalog.populations.iter().map(|p| p.id).collect();
        let missions: BTreeSet<MissionRef> = self.missions.iter().map(|m| m.id).collect();
        let meta_states: BTreeSet<MetaStateRef> = self.meta_states.iter().map(|m| m.id).collect();

        let mut regions = BTreeSet::new();
        for region in &self.regions {
            if !regions.insert(region.id) {
                return Err(ScenarioError::DuplicateRegion(region.id));
            }
            let mut areas = BTreeSet::new();
            for area in &region.areas {
                if !areas.insert(area.id) {
                    return Err(ScenarioError::DuplicateArea {
                        region: region.id,
                        area: area.id,
                    });
                }
                if let Some(population) = area.population {
                    if !populations.contains(&population) {
                        return Err(ScenarioError::UnknownPopulation {
                            region: region.id,
                            area: area.id,
                            population,
                        });
                    }
                }
            }
            for marker in &region.markers {
                if !areas.contains(&marker.area) {
                    return Err(ScenarioError::MarkerOutsideRegion {
                        region: region.id,
                        marker: marker.marker,
                        area: marker.area,
                    });
                }
            }
            if let Some(mission) = region.missions.iter().find(|m| !missions.contains(*m)) {
                return Err(ScenarioError::UnknownMission {
                    region: region.id,
                    mission: *mission,
                });
            }
            if let Some(meta_state) = region.meta_states.iter().find(|m| !meta_states.contains(*m)) {
                return Err(ScenarioError::UnknownMetaState {
                    region: region.id,
                    meta_state: *meta_state,
                });
            }
        }
        Ok(())
    }

    pub fn build_catalog(&self) -> PopulationCatalog {
        let mut catalog = PopulationCatalog::new();
        for object in &self.catalog.objects {
            catalog.insert_object(object.clone());
        }
        for list in &self.catalog.lists {
            catalog.insert_list(list.clone());
        }
        for theme in &self.catalog.themes {
            catalog.insert_theme(theme.clone());
        }
        for population in &self.catalog.populations {
            catalog.insert_population(population.clone());
        }
        catalog
    }

    pub fn build_regions(&self) -> Vec<RegionWorld> {
        self.regions.iter().map(ScenarioRegion::build_world).collect()
    }

    pub fn mission(&self, id: MissionRef) -> Option<&MissionDefinition> {
        self.missions.iter().find(|mission| mission.id == id)
    }

    pub fn meta_state(&self, id: MetaStateRef) -> Option<&MetaStateDefinition> {
        self.meta_states.iter().find(|meta_state| meta_state.id == id)
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks.or(self.ticks).unwrap_or(120)
    }
}

impl ScenarioRegion {
    pub fn build_world(&self) -> RegionWorld {
        let mut world = RegionWorld::new(self.id, self.difficulty);
        for area in &self.areas {
            world.add_area(area.id, area.spawnable_area, &area.cells);
        }
        for marker in &self.markers {
            world.add_marker(marker.marker, marker.area, marker.slots);
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: minimal
seed: 3
catalog:
  objects:
    - id: 1
      entities: [10]
  populations:
    - id: 100
      cluster_density_pct: 50
      themes: [200]
regions:
  - id: 1
    areas:
      - id: 1
        spawnable_area: 400
        population: 100
    markers:
      - marker: 9
        area: 1
        slots: 2
"#;

    fn parse(yaml: &str) -> Scenario {
        serde_yaml::from_str(yaml).expect("scenario parses")
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let scenario = parse(MINIMAL);
        assert_eq!(scenario.tick_ms, 100);
        assert_eq!(scenario.snapshot_interval_ticks, 30);
        assert_eq!(scenario.logging.level, "info");
        assert_eq!(scenario.tuning, PopulationTuning::default());
        assert_eq!(scenario.ticks(None), 120);
        assert_eq!(scenario.ticks(Some(5)), 5);
        assert_eq!(scenario.regions[0].difficulty, DifficultyTier::Normal);
        assert_eq!(scenario.catalog.objects[0].average_size, 1.0);
        assert_eq!(scenario.validate(), Ok(()));
    }

    #[test]
    fn builds_region_worlds_and_catalog() {
        let scenario = parse(MINIMAL);
        let catalog = scenario.build_catalog();
        assert_eq!(catalog.object_count(), 1);
        assert!(catalog.population(PrototypeId(100)).is_ok());

        let worlds = scenario.build_regions();
        assert_eq!(worlds.len(), 1);
        assert_eq!(worlds[0].region(), RegionId(1));
        assert_eq!(
            worlds[0].marker_slots(MarkerRef(9), AreaId(1)).map(|s| s.capacity),
            Some(2)
        );
    }

    #[test]
    fn rejects_dangling_references() {
        let mut scenario = parse(MINIMAL);
        scenario.regions[0].missions.push(MissionRef(4));
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::UnknownMission {
                region: RegionId(1),
                mission: MissionRef(4)
            })
        );

        let mut scenario = parse(MINIMAL);
        scenario.regions[0].markers[0].area = AreaId(7);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::MarkerOutsideRegion { .. })
        ));

        let mut scenario = parse(MINIMAL);
        scenario.regions[0].areas[0].population = Some(PrototypeId(999));
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::UnknownPopulation { .. })
        ));

        let mut scenario = parse(MINIMAL);
        let duplicate = scenario.regions[0].clone();
        scenario.regions.push(duplicate);
        assert_eq!(scenario.validate(), Err(ScenarioError::DuplicateRegion(RegionId(1))));
    }

    #[test]
    fn rejects_degenerate_cluster_area() {
        for cluster_area in [0.0, -4.0, f32::INFINITY] {
            let mut scenario = parse(MINIMAL);
            scenario.tuning.cluster_area = cluster_area;
            assert_eq!(
                scenario.validate(),
                Err(ScenarioError::NonPositiveClusterArea(cluster_area))
            );
        }

        let mut scenario = parse(MINIMAL);
        scenario.tuning.cluster_area = f32::NAN;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::NonPositiveClusterArea(_))
        ));
    }
}
