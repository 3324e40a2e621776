//! Resolved population configuration: object templates, nested lists,
//! themes and area populations. Read-only once built.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PopulationError;
use crate::ids::{MarkerRef, PrototypeId};

fn default_average_size() -> f32 {
    1.0
}

fn default_encounter_density() -> f32 {
    100.0
}

/// One spawnable archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationObjectTemplate {
    pub id: PrototypeId,
    #[serde(default)]
    pub name: String,
    /// Population marker this object prefers to spawn at.
    #[serde(default)]
    pub marker: Option<MarkerRef>,
    #[serde(default = "default_average_size")]
    pub average_size: f32,
    /// Entity prototypes that make up one spawn group.
    #[serde(default)]
    pub entities: Vec<PrototypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationEntry {
    pub object: PrototypeId,
    pub weight: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationList {
    pub id: PrototypeId,
    #[serde(default)]
    pub entries: Vec<PopulationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationTheme {
    pub id: PrototypeId,
    #[serde(default)]
    pub enemies: Vec<PopulationEntry>,
    #[serde(default)]
    pub encounters: Vec<PopulationEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncounterDensity {
    pub marker: MarkerRef,
    pub density: f32,
}

/// Population settings attached to an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPopulation {
    pub id: PrototypeId,
    #[serde(default)]
    pub cluster_density_pct: f32,
    #[serde(default)]
    pub use_spawn_map: bool,
    #[serde(default)]
    pub themes: Vec<PrototypeId>,
    #[serde(default)]
    pub global_encounters: Vec<PopulationEntry>,
    #[serde(default)]
    pub encounter_densities: Vec<EncounterDensity>,
    /// Used for markers without an explicit entry.
    #[serde(default = "default_encounter_density")]
    pub default_encounter_density: f32,
}

impl AreaPopulation {
    /// Encounter density in percent for a marker.
    pub fn encounter_density(&self, marker: MarkerRef) -> f32 {
        self.encounter_densities
            .iter()
            .find(|entry| entry.marker == marker)
            .map(|entry| entry.density)
            .unwrap_or(self.default_encounter_density)
    }
}

/// A catalog reference resolved to either a leaf object or a nested list.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedPopulation<'a> {
    Object(&'a Arc<PopulationObjectTemplate>),
    List(&'a [PopulationEntry]),
}

#[derive(Debug, Default, Clone)]
pub struct PopulationCatalog {
    objects: HashMap<PrototypeId, Arc<PopulationObjectTemplate>>,
    lists: HashMap<PrototypeId, Vec<PopulationEntry>>,
    themes: HashMap<PrototypeId, PopulationTheme>,
    populations: HashMap<PrototypeId, AreaPopulation>,
}

impl PopulationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&mut self, template: PopulationObjectTemplate) -> Arc<PopulationObjectTemplate> {
        let template = Arc::new(template);
        self.objects.insert(template.id, Arc::clone(&template));
        template
    }

    pub fn insert_list(&mut self, list: PopulationList) {
        self.lists.insert(list.id, list.entries);
    }

    pub fn insert_theme(&mut self, theme: PopulationTheme) {
        self.themes.insert(theme.id, theme);
    }

    pub fn insert_population(&mut self, population: AreaPopulation) {
        self.populations.insert(population.id, population);
    }

    pub fn resolve(&self, id: PrototypeId) -> Result<ResolvedPopulation<'_>, PopulationError> {
        if let Some(object) = self.objects.get(&id) {
            return Ok(ResolvedPopulation::Object(object));
        }
        self.lists
            .get(&id)
            .map(|entries| ResolvedPopulation::List(entries.as_slice()))
            .ok_or_else(|| PopulationError::missing("population", id))
    }

    pub fn object(&self, id: PrototypeId) -> Result<Arc<PopulationObjectTemplate>, PopulationError> {
        self.objects
            .get(&id)
            .cloned()
            .ok_or_else(|| PopulationError::missing("population object", id))
    }

    pub fn theme(&self, id: PrototypeId) -> Result<&PopulationTheme, PopulationError> {
        self.themes
            .get(&id)
            .ok_or_else(|| PopulationError::missing("population theme", id))
    }

    pub fn population(&self, id: PrototypeId) -> Result<&AreaPopulation, PopulationError> {
        self.populations
            .get(&id)
            .ok_or_else(|| PopulationError::missing("area population", id))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}
