//! Population generation algorithms, one per requester kind.

mod area;
mod meta_state;
mod mission;

use std::time::Duration;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::boundary::{MarkerRegistry, RegionView};
use crate::catalog::PopulationCatalog;

pub use area::{contained_encounters, populate_area, populate_picker, AreaPopulationSummary};
pub use meta_state::{add_required_objects, MetaStateDefinition, RequiredObject};
pub use mission::{register_mission_population, MissionDefinition, MissionPopulationEntry};

fn default_cluster_area() -> f32 {
    60.0
}

fn default_max_spawns_per_tick() -> usize {
    256
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationTuning {
    /// Side length of the reference cluster; density maths uses its square.
    #[serde(default = "default_cluster_area")]
    pub cluster_area: f32,
    /// Materializations allowed per region tick. Zero removes the limit.
    #[serde(default = "default_max_spawns_per_tick")]
    pub max_spawns_per_tick: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl PopulationTuning {
    pub fn cluster_sq(&self) -> f32 {
        self.cluster_area * self.cluster_area
    }

    pub fn spawn_budget(&self) -> usize {
        if self.max_spawns_per_tick == 0 {
            usize::MAX
        } else {
            self.max_spawns_per_tick
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for PopulationTuning {
    fn default() -> Self {
        Self {
            cluster_area: default_cluster_area(),
            max_spawns_per_tick: default_max_spawns_per_tick(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Collaborators a generation pass reads from, borrowed for one pass.
pub struct GenerationContext<'a> {
    pub region: &'a dyn RegionView,
    pub markers: &'a dyn MarkerRegistry,
    pub catalog: &'a PopulationCatalog,
    pub tuning: &'a PopulationTuning,
    pub rng: &'a mut ChaCha8Rng,
    pub now: Duration,
}
