pub mod boundary;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod ids;
pub mod location;
pub mod manager;
pub mod picker;
pub mod policies;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod spawn;
pub mod world;

pub use boundary::{EntityLifecycle, MarkerRegistry, RegionView, RequesterHooks};
pub use engine::{Engine, EngineBuilder, EngineSettings, RegionSimulation, TickSummary};
pub use error::PopulationError;
pub use manager::{DrainReport, PopulationManager};
pub use scenario::{Scenario, ScenarioLoader};
pub use spawn::{SpawnEvent, SpawnPolicy};
