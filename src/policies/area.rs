//! Area population: density-budgeted ambient fill plus marker encounters.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{
    AreaPopulation, PopulationCatalog, PopulationEntry, PopulationObjectTemplate, PopulationTheme,
    ResolvedPopulation,
};
use crate::ids::{AreaId, MarkerRef, PrototypeId};
use crate::location::SpawnLocation;
use crate::picker::WeightedPicker;
use crate::spawn::{PopulationRequest, SpawnEvent};

use super::GenerationContext;

/// Upper bound on list expansions under one top-level encounter entry.
/// Lists already being expanded higher up the same chain are not expanded
/// again, so a cycle contributes its leaves once.
const MAX_LIST_EXPANSIONS: usize = 4_096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AreaPopulationSummary {
    pub ambient: usize,
    pub markers: usize,
    pub encounter_objects: usize,
    pub skipped: usize,
}

impl AreaPopulationSummary {
    pub fn scheduled(&self) -> usize {
        self.ambient + self.encounter_objects
    }
}

struct MarkerBucket {
    count: usize,
    picker: WeightedPicker<Arc<PopulationObjectTemplate>>,
}

/// Builds an ambient picker from weighted entries. Entries with no weight,
/// no template, or a non-positive footprint are left out; the second value
/// counts them.
pub fn populate_picker(
    catalog: &PopulationCatalog,
    entries: &[PopulationEntry],
) -> (WeightedPicker<Arc<PopulationObjectTemplate>>, usize) {
    let mut picker = WeightedPicker::new();
    let mut skipped = 0;
    for entry in entries {
        if entry.weight <= 0 {
            continue;
        }
        match catalog.object(entry.object) {
            Ok(template) if template.average_size <= 0.0 => {
                warn!(
                    object = %template.id,
                    average_size = template.average_size,
                    "skipping ambient archetype without a positive footprint"
                );
                skipped += 1;
            }
            Ok(template) => {
                picker.add(template, entry.weight);
            }
            Err(err) => {
                warn!(error = %err, "skipping ambient entry");
                skipped += 1;
            }
        }
    }
    (picker, skipped)
}

enum Flatten {
    Visit(PopulationEntry),
    Leave(PrototypeId),
}

/// Flattens nested population lists into leaf encounter entries, depth
/// first and in declaration order. A top-level entry that cycles or nests
/// past the expansion budget loses only its own unexpanded lists.
pub fn contained_encounters(
    catalog: &PopulationCatalog,
    entries: &[PopulationEntry],
) -> Vec<PopulationEntry> {
    let mut encounters = Vec::new();
    for top in entries {
        flatten_entry(catalog, *top, &mut encounters);
    }
    encounters
}

fn flatten_entry(
    catalog: &PopulationCatalog,
    top: PopulationEntry,
    out: &mut Vec<PopulationEntry>,
) {
    let mut stack = vec![Flatten::Visit(top)];
    let mut expanding: HashSet<PrototypeId> = HashSet::new();
    let mut expansions = 0;
    let mut truncated = false;

    while let Some(work) = stack.pop() {
        let entry = match work {
            Flatten::Leave(list) => {
                expanding.remove(&list);
                continue;
            }
            Flatten::Visit(entry) => entry,
        };
        if entry.weight <= 0 {
            continue;
        }
        match catalog.resolve(entry.object) {
            Ok(ResolvedPopulation::Object(_)) => out.push(entry),
            Ok(ResolvedPopulation::List(nested)) => {
                if expanding.contains(&entry.object) {
                    warn!(
                        list = %entry.object,
                        root = %top.object,
                        "encounter list contains itself, skipping"
                    );
                    continue;
                }
                if expansions >= MAX_LIST_EXPANSIONS {
                    if !truncated {
                        warn!(
                            root = %top.object,
                            limit = MAX_LIST_EXPANSIONS,
                            "encounter lists nest too deeply, truncating"
                        );
                        truncated = true;
                    }
                    continue;
                }
                expansions += 1;
                expanding.insert(entry.object);
                stack.push(Flatten::Leave(entry.object));
                stack.extend(nested.iter().rev().copied().map(Flatten::Visit));
            }
            Err(err) => warn!(error = %err, "skipping encounter entry"),
        }
    }
}

/// Fills an area with ambient population and marker encounters. Bad
/// configuration entries are skipped and counted, never fatal.
pub fn populate_area(
    event: &mut SpawnEvent,
    ctx: &mut GenerationContext<'_>,
    area: AreaId,
    population: &AreaPopulation,
) -> AreaPopulationSummary {
    let mut summary = AreaPopulationSummary::default();
    let catalog = ctx.catalog;
    let location = SpawnLocation::area(ctx.region.region_id(), area);
    let spawnable_area = location.spawnable_area(ctx.region);
    if spawnable_area <= 0.0 || population.use_spawn_map {
        debug!(%area, spawnable_area, "area has no spawnable population space");
        return summary;
    }
    let Some(theme_id) = population.themes.first() else {
        return summary;
    };
    let theme = match catalog.theme(*theme_id) {
        Ok(theme) => theme,
        Err(err) => {
            warn!(%area, error = %err, "area population theme unavailable");
            summary.skipped += 1;
            return summary;
        }
    };

    let density = spawnable_area / ctx.tuning.cluster_sq() * (population.cluster_density_pct / 100.0);
    ambient_fill(event, ctx, &location, theme, density, &mut summary);

    let mut encounters = contained_encounters(catalog, &population.global_encounters);
    encounters.extend(contained_encounters(catalog, &theme.encounters));
    encounter_fill(event, ctx, &location, area, population, &encounters, &mut summary);

    debug!(
        %area,
        population = %population.id,
        ambient = summary.ambient,
        markers = summary.markers,
        encounters = summary.encounter_objects,
        "scheduled area population"
    );
    summary
}

fn ambient_fill(
    event: &mut SpawnEvent,
    ctx: &mut GenerationContext<'_>,
    location: &SpawnLocation,
    theme: &PopulationTheme,
    mut density: f32,
    summary: &mut AreaPopulationSummary,
) {
    let (picker, skipped) = populate_picker(ctx.catalog, &theme.enemies);
    summary.skipped += skipped;
    if !density.is_finite() {
        warn!(
            density,
            cluster_area = ctx.tuning.cluster_area,
            "ambient density is not finite, skipping"
        );
        summary.skipped += 1;
        return;
    }
    if picker.is_empty() || density <= 0.0 {
        return;
    }

    // Every picker item has a positive footprint, so this bounds the loop.
    let min_size = picker
        .items()
        .map(|template| template.average_size)
        .fold(f32::INFINITY, f32::min);
    let max_iterations = (density / min_size).ceil() as usize;

    while density > 0.0 && summary.ambient < max_iterations {
        let template = match picker.pick(&mut *ctx.rng) {
            Ok(template) => Arc::clone(template),
            Err(_) => break,
        };
        density -= template.average_size;
        let request = PopulationRequest::new(template, location.clone());
        if let Err(err) = event.add_population_object(ctx.now, request) {
            warn!(error = %err, "ambient fill stopped");
            break;
        }
        summary.ambient += 1;
    }
}

fn encounter_fill(
    event: &mut SpawnEvent,
    ctx: &mut GenerationContext<'_>,
    location: &SpawnLocation,
    area: AreaId,
    population: &AreaPopulation,
    encounters: &[PopulationEntry],
    summary: &mut AreaPopulationSummary,
) {
    let markers = ctx.markers;
    let mut buckets: BTreeMap<MarkerRef, Option<MarkerBucket>> = BTreeMap::new();

    for entry in encounters {
        let template = match ctx.catalog.object(entry.object) {
            Ok(template) => template,
            Err(err) => {
                warn!(error = %err, "skipping encounter");
                summary.skipped += 1;
                continue;
            }
        };
        let Some(marker) = template.marker else {
            debug!(object = %template.id, "encounter declares no population marker");
            summary.skipped += 1;
            continue;
        };

        let bucket = buckets.entry(marker).or_insert_with(|| {
            let slots = markers.free_slots(marker, area);
            if slots == 0 {
                return None;
            }
            let density = population.encounter_density(marker) / 100.0;
            let count = ((slots as f32 * density) as usize).max(1);
            Some(MarkerBucket {
                count,
                picker: WeightedPicker::new(),
            })
        });
        if let Some(bucket) = bucket {
            bucket.picker.add(template, entry.weight);
        }
    }

    for (marker, bucket) in buckets {
        // Zero free slots: expected under occupancy.
        let Some(bucket) = bucket else {
            continue;
        };
        let template = match bucket.picker.pick(&mut *ctx.rng) {
            Ok(template) => Arc::clone(template),
            Err(err) => {
                warn!(%marker, error = %err, "no encounter could be picked");
                continue;
            }
        };
        for _ in 0..bucket.count {
            let request = PopulationRequest::new(Arc::clone(&template), location.clone())
                .at_marker(Some(marker));
            if let Err(err) = event.add_population_object(ctx.now, request) {
                warn!(%marker, error = %err, "encounter fill stopped");
                return;
            }
            summary.encounter_objects += 1;
        }
        summary.markers += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EncounterDensity, PopulationList};
    use crate::ids::{DifficultyTier, RegionId, SpawnEventId};
    use crate::policies::PopulationTuning;
    use crate::spawn::SpawnPolicy;
    use crate::world::RegionWorld;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;
    use std::time::Duration;

    const AREA: AreaId = AreaId(10);

    fn object(id: u64, marker: Option<u64>, size: f32) -> PopulationObjectTemplate {
        PopulationObjectTemplate {
            id: PrototypeId(id),
            name: format!("object_{id}"),
            marker: marker.map(MarkerRef),
            average_size: size,
            entities: vec![PrototypeId(id * 100)],
        }
    }

    fn entry(object: u64, weight: i32) -> PopulationEntry {
        PopulationEntry {
            object: PrototypeId(object),
            weight,
        }
    }

    fn population(density_pct: f32, global: Vec<PopulationEntry>) -> AreaPopulation {
        AreaPopulation {
            id: PrototypeId(500),
            cluster_density_pct: density_pct,
            use_spawn_map: false,
            themes: vec![PrototypeId(400)],
            global_encounters: global,
            encounter_densities: Vec::new(),
            default_encounter_density: 100.0,
        }
    }

    fn tuning() -> PopulationTuning {
        PopulationTuning {
            cluster_area: 10.0,
            ..PopulationTuning::default()
        }
    }

    fn area_event() -> SpawnEvent {
        SpawnEvent::new(SpawnEventId(1), RegionId(1), SpawnPolicy::Area { area: AREA })
    }

    fn run(
        world: &RegionWorld,
        catalog: &PopulationCatalog,
        population: &AreaPopulation,
        seed: u64,
    ) -> (SpawnEvent, AreaPopulationSummary) {
        run_with_tuning(world, catalog, population, seed, tuning())
    }

    fn run_with_tuning(
        world: &RegionWorld,
        catalog: &PopulationCatalog,
        population: &AreaPopulation,
        seed: u64,
        tuning: PopulationTuning,
    ) -> (SpawnEvent, AreaPopulationSummary) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut ctx = GenerationContext {
            region: world,
            markers: world,
            catalog,
            tuning: &tuning,
            rng: &mut rng,
            now: Duration::ZERO,
        };
        let mut event = area_event();
        let summary = populate_area(&mut event, &mut ctx, AREA, population);
        (event, summary)
    }

    #[test]
    fn ambient_fill_consumes_density_budget() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 1_000.0, &[]);
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, None, 1.0));
        catalog.insert_theme(PopulationTheme {
            id: PrototypeId(400),
            enemies: vec![entry(1, 1)],
            encounters: Vec::new(),
        });

        let (event, summary) = run(&world, &catalog, &population(50.0, Vec::new()), 7);
        assert_eq!(summary.ambient, 5);
        let location = SpawnLocation::area(RegionId(1), AREA);
        assert_eq!(event.location_scheduler(&location).map(|s| s.len()), Some(5));
        assert!(event.pending_objects().all(|object| !object.is_marker()));
    }

    #[test]
    fn ambient_fill_is_bounded_by_smallest_footprint() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 2_000.0, &[]);
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, None, 0.5));
        catalog.insert_object(object(2, None, 3.0));
        catalog.insert_object(object(3, None, 0.0));
        catalog.insert_object(object(4, None, -1.0));
        catalog.insert_theme(PopulationTheme {
            id: PrototypeId(400),
            enemies: vec![entry(1, 2), entry(2, 5), entry(3, 10), entry(4, 10), entry(99, 3)],
            encounters: Vec::new(),
        });

        // budget = 2000 / 100 * 1.0 = 20
        let (_, summary) = run(&world, &catalog, &population(100.0, Vec::new()), 3);
        assert!(summary.ambient > 0);
        assert!(summary.ambient <= (20.0f32 / 0.5).ceil() as usize);
        assert_eq!(summary.skipped, 3, "zero, negative and missing archetypes are skipped");
    }

    #[test]
    fn zero_footprint_only_schedules_nothing() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 1_000.0, &[]);
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, None, 0.0));
        catalog.insert_theme(PopulationTheme {
            id: PrototypeId(400),
            enemies: vec![entry(1, 1)],
            encounters: Vec::new(),
        });
        let (event, summary) = run(&world, &catalog, &population(50.0, Vec::new()), 1);
        assert_eq!(summary.ambient, 0);
        assert_eq!(event.pending_count(), 0);
    }

    #[test]
    fn no_spawnable_area_skips_the_pass() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 0.0, &[]);
        let catalog = PopulationCatalog::new();
        let (event, summary) = run(&world, &catalog, &population(50.0, Vec::new()), 1);
        assert_eq!(summary, AreaPopulationSummary::default());
        assert_eq!(event.scheduler_count(), 0);
    }

    #[test]
    fn encounter_fill_picks_one_winner_per_marker() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 1_000.0, &[]);
        world.add_marker(MarkerRef(70), AREA, 4);
        world.add_marker(MarkerRef(71), AREA, 3);
        world.add_marker(MarkerRef(72), AREA, 0);

        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, Some(70), 1.0));
        catalog.insert_object(object(2, Some(70), 1.0));
        catalog.insert_object(object(3, Some(71), 1.0));
        catalog.insert_object(object(4, Some(72), 1.0));
        catalog.insert_theme(PopulationTheme {
            id: PrototypeId(400),
            enemies: Vec::new(),
            encounters: vec![entry(1, 1), entry(2, 1), entry(4, 1)],
        });
        let mut population = population(50.0, vec![entry(3, 1)]);
        population.encounter_densities = vec![EncounterDensity {
            marker: MarkerRef(71),
            density: 10.0,
        }];

        for seed in 0..16 {
            let (event, summary) = run(&world, &catalog, &population, seed);
            assert_eq!(summary.markers, 2, "marker with no free slots is skipped");

            let first = event.marker_scheduler(MarkerRef(70)).expect("marker 70 scheduled");
            assert_eq!(first.len(), 4);
            let winners: BTreeSet<PrototypeId> = first.pending().map(|o| o.template.id).collect();
            assert_eq!(winners.len(), 1, "a marker receives a single winning template");

            // floor(3 * 0.1) = 0, raised to one
            let second = event.marker_scheduler(MarkerRef(71)).expect("marker 71 scheduled");
            assert_eq!(second.len(), 1);
            assert!(event.marker_scheduler(MarkerRef(72)).is_none());
        }
    }

    #[test]
    fn encounter_count_never_exceeds_free_slots() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 1_000.0, &[]);
        let mut catalog = PopulationCatalog::new();
        catalog.insert_theme(PopulationTheme {
            id: PrototypeId(400),
            enemies: Vec::new(),
            encounters: vec![entry(1, 1)],
        });
        catalog.insert_object(object(1, Some(70), 1.0));

        for slots in 1..12u32 {
            for density in [1.0f32, 33.0, 50.0, 99.0, 100.0] {
                let mut world = world.clone();
                world.add_marker(MarkerRef(70), AREA, slots);
                let mut population = population(0.0, Vec::new());
                population.default_encounter_density = density;
                let (event, _) = run(&world, &catalog, &population, 11);
                let count = event.marker_scheduler(MarkerRef(70)).map_or(0, |s| s.len());
                assert!(count >= 1);
                assert!(count <= slots as usize, "{count} > {slots} at {density}%");
            }
        }
    }

    #[test]
    fn nested_lists_flatten_without_recursion() {
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, Some(70), 1.0));
        catalog.insert_object(object(2, Some(70), 1.0));
        let depth = 10_000u64;
        for level in 0..depth {
            let next = if level + 1 == depth { 1 } else { 1_000 + level + 1 };
            catalog.insert_list(PopulationList {
                id: PrototypeId(1_000 + level),
                entries: vec![entry(next, 1)],
            });
        }
        catalog.insert_list(PopulationList {
            id: PrototypeId(900),
            entries: vec![entry(2, 4), entry(1, 0), entry(77, 1), entry(1, 2)],
        });

        let flat = contained_encounters(&catalog, &[entry(900, 1), entry(1, 3)]);
        assert_eq!(flat, vec![entry(2, 4), entry(1, 2), entry(1, 3)]);

        // Deep chains are truncated instead of overflowing the stack, and
        // only the chain itself is lost.
        let deep = contained_encounters(&catalog, &[entry(1_000, 1), entry(2, 5)]);
        assert_eq!(deep, vec![entry(2, 5)]);
    }

    #[test]
    fn cyclic_lists_terminate() {
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, Some(70), 1.0));
        catalog.insert_list(PopulationList {
            id: PrototypeId(800),
            entries: vec![entry(1, 1), entry(801, 1)],
        });
        catalog.insert_list(PopulationList {
            id: PrototypeId(801),
            entries: vec![entry(800, 1)],
        });
        let flat = contained_encounters(&catalog, &[entry(800, 1)]);
        assert_eq!(flat, vec![entry(1, 1)], "a cycle contributes its leaves once");
    }

    #[test]
    fn cyclic_list_keeps_later_siblings() {
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(2, Some(71), 1.0));
        catalog.insert_list(PopulationList {
            id: PrototypeId(800),
            entries: vec![entry(801, 1)],
        });
        catalog.insert_list(PopulationList {
            id: PrototypeId(801),
            entries: vec![entry(800, 1)],
        });
        let flat = contained_encounters(&catalog, &[entry(800, 1), entry(2, 1)]);
        assert_eq!(flat, vec![entry(2, 1)]);
    }

    #[test]
    fn shared_sublists_count_once_per_reference() {
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, Some(70), 1.0));
        catalog.insert_list(PopulationList {
            id: PrototypeId(810),
            entries: vec![entry(1, 2)],
        });
        catalog.insert_list(PopulationList {
            id: PrototypeId(811),
            entries: vec![entry(810, 1), entry(810, 1)],
        });
        let flat = contained_encounters(&catalog, &[entry(811, 1)]);
        assert_eq!(flat, vec![entry(1, 2), entry(1, 2)]);
    }

    #[test]
    fn zero_cluster_area_schedules_no_ambient_population() {
        let mut world = RegionWorld::new(RegionId(1), DifficultyTier::Normal);
        world.add_area(AREA, 1_000.0, &[]);
        world.add_marker(MarkerRef(70), AREA, 2);
        let mut catalog = PopulationCatalog::new();
        catalog.insert_object(object(1, None, 1.0));
        catalog.insert_object(object(2, Some(70), 1.0));
        catalog.insert_theme(PopulationTheme {
            id: PrototypeId(400),
            enemies: vec![entry(1, 1)],
            encounters: vec![entry(2, 1)],
        });
        let tuning = PopulationTuning {
            cluster_area: 0.0,
            ..PopulationTuning::default()
        };

        let (event, summary) =
            run_with_tuning(&world, &catalog, &population(50.0, Vec::new()), 4, tuning);
        assert_eq!(summary.ambient, 0);
        assert_eq!(summary.skipped, 1);
        // Marker encounters do not depend on the cluster size.
        assert_eq!(summary.encounter_objects, 2);
        assert_eq!(event.pending_count(), 2);
    }
}
