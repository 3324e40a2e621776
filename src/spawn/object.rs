use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::catalog::PopulationObjectTemplate;
use crate::ids::{MarkerRef, MissionRef, PopulationObjectId, SpawnEventId};
use crate::location::SpawnLocation;

/// Where a population object materializes. Marker-bound objects still carry
/// the scope they were requested in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpawnTarget {
    Marker {
        marker: MarkerRef,
        location: SpawnLocation,
    },
    Location(SpawnLocation),
}

impl SpawnTarget {
    pub fn is_marker(&self) -> bool {
        matches!(self, SpawnTarget::Marker { .. })
    }

    pub fn marker(&self) -> Option<MarkerRef> {
        match self {
            SpawnTarget::Marker { marker, .. } => Some(*marker),
            SpawnTarget::Location(_) => None,
        }
    }

    pub fn location(&self) -> &SpawnLocation {
        match self {
            SpawnTarget::Marker { location, .. } => location,
            SpawnTarget::Location(location) => location,
        }
    }

    pub fn scheduler_key(&self) -> SchedulerKey {
        match self {
            SpawnTarget::Marker { marker, .. } => SchedulerKey::Marker(*marker),
            SpawnTarget::Location(location) => SchedulerKey::Location(location.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SchedulerKey {
    Marker(MarkerRef),
    Location(SpawnLocation),
}

/// Properties stamped onto spawned entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyOverrides {
    pub mission: Option<MissionRef>,
    pub values: BTreeMap<String, i64>,
}

/// Arguments of `SpawnEvent::add_population_object`.
#[derive(Debug, Clone)]
pub struct PopulationRequest {
    pub template: Arc<PopulationObjectTemplate>,
    pub location: SpawnLocation,
    pub marker: Option<MarkerRef>,
    pub critical: bool,
    pub mission: Option<MissionRef>,
    pub delay: Option<Duration>,
    pub remove_on_fail: bool,
    pub properties: BTreeMap<String, i64>,
}

impl PopulationRequest {
    pub fn new(template: Arc<PopulationObjectTemplate>, location: SpawnLocation) -> Self {
        Self {
            template,
            location,
            marker: None,
            critical: false,
            mission: None,
            delay: None,
            remove_on_fail: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn at_marker(mut self, marker: Option<MarkerRef>) -> Self {
        self.marker = marker;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn for_mission(mut self, mission: Option<MissionRef>) -> Self {
        self.mission = mission;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn remove_on_fail(mut self, remove: bool) -> Self {
        self.remove_on_fail = remove;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: i64) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// One pending spawn request, owned by exactly one scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct PopulationObject {
    pub id: PopulationObjectId,
    pub event: SpawnEventId,
    pub target: SpawnTarget,
    #[serde(skip)]
    pub template: Arc<PopulationObjectTemplate>,
    pub mission: Option<MissionRef>,
    pub properties: Option<PropertyOverrides>,
    /// Absolute simulation time; zero means immediate.
    pub due: Duration,
    pub critical: bool,
    pub remove_on_fail: bool,
    pub failed_attempts: u32,
    pub(crate) sequence: u64,
}

impl PopulationObject {
    pub(crate) fn from_request(
        id: PopulationObjectId,
        event: SpawnEventId,
        now: Duration,
        request: PopulationRequest,
    ) -> Self {
        let PopulationRequest {
            template,
            location,
            marker,
            critical,
            mission,
            delay,
            remove_on_fail,
            properties,
        } = request;

        let target = match marker {
            Some(marker) => SpawnTarget::Marker { marker, location },
            None => SpawnTarget::Location(location),
        };
        let overrides = if mission.is_some() || !properties.is_empty() {
            Some(PropertyOverrides {
                mission,
                values: properties,
            })
        } else {
            None
        };
        let due = match delay {
            Some(delay) => now + delay,
            None => Duration::ZERO,
        };

        Self {
            id,
            event,
            target,
            template,
            mission,
            properties: overrides,
            due,
            critical,
            remove_on_fail,
            failed_attempts: 0,
            sequence: 0,
        }
    }

    pub fn is_marker(&self) -> bool {
        self.target.is_marker()
    }

    pub fn scheduler_key(&self) -> SchedulerKey {
        self.target.scheduler_key()
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.due <= now
    }
}
