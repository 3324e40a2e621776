use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Data reference to a configuration record (object, list, theme, population).
    PrototypeId,
    "proto"
);
id_type!(RegionId, "region");
id_type!(AreaId, "area");
id_type!(CellId, "cell");
id_type!(
    /// A fixed placement point with finite reservation capacity.
    MarkerRef,
    "marker"
);
id_type!(MissionRef, "mission");
id_type!(MetaStateRef, "meta_state");
id_type!(SpawnEventId, "spawn_event");
id_type!(PopulationObjectId, "population_object");
id_type!(
    /// A realized spawn group, owned by the entity system.
    GroupId,
    "group"
);
id_type!(EntityId, "entity");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Normal,
    Heroic,
    Cosmic,
}

impl Default for DifficultyTier {
    fn default() -> Self {
        DifficultyTier::Normal
    }
}

/// Difficulty filter shared by mission and meta-state entries. An empty
/// filter allows every tier.
pub fn tier_allowed(allowed: &[DifficultyTier], tier: DifficultyTier) -> bool {
    allowed.is_empty() || allowed.contains(&tier)
}
