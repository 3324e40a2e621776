//! Population objects, their keyed schedulers and the spawn events that own them.

mod event;
mod object;
mod scheduler;

pub use event::{
    DrainOutcome, RespawnPolicy, RetiredEvent, SpawnEvent, SpawnEventState, SpawnPolicy,
};
pub use object::{PopulationObject, PopulationRequest, PropertyOverrides, SchedulerKey, SpawnTarget};
pub use scheduler::SpawnScheduler;
