use thiserror::Error;

use crate::ids::{AreaId, MarkerRef, PopulationObjectId, PrototypeId, SpawnEventId};

/// Failures raised by the spawn scheduling core. None of them are fatal to
/// the owning region; generation recovers locally and materialization
/// failures surface through the completion predicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PopulationError {
    #[error("configuration missing: {what} {id}")]
    ConfigurationMissing { what: &'static str, id: PrototypeId },

    #[error("{marker} has no free reservation slots in {area}")]
    CapacityExhausted { marker: MarkerRef, area: AreaId },

    #[error("weighted picker drawn with an empty pool")]
    EmptyPool,

    #[error("failed to materialize {object}: {reason}")]
    MaterializationFailure {
        object: PopulationObjectId,
        reason: String,
    },

    #[error("unknown {0}")]
    UnknownSpawnEvent(SpawnEventId),

    #[error("{0} has been retired")]
    EventRetired(SpawnEventId),
}

impl PopulationError {
    pub fn missing(what: &'static str, id: PrototypeId) -> Self {
        PopulationError::ConfigurationMissing { what, id }
    }
}
