//! Periodic JSON checkpoints of every region's population state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{RegionId, SpawnEventId};
use crate::manager::PopulationManager;
use crate::spawn::{SpawnEventState, SpawnPolicy};
use crate::world::RegionWorld;

#[derive(Debug, Clone, Serialize)]
pub struct EventSnapshot {
    pub id: SpawnEventId,
    pub policy: SpawnPolicy,
    pub state: SpawnEventState,
    pub pending: usize,
    pub critical_pending: usize,
    pub schedulers: usize,
    pub groups: usize,
    pub entities: usize,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionSnapshot {
    pub region: RegionId,
    pub live_entities: usize,
    pub events: Vec<EventSnapshot>,
}

impl RegionSnapshot {
    pub fn capture(manager: &PopulationManager, world: &RegionWorld) -> Self {
        let events = manager
            .events()
            .map(|event| EventSnapshot {
                id: event.id(),
                policy: event.policy(),
                state: event.state(),
                pending: event.pending_count(),
                critical_pending: event.critical_pending(),
                schedulers: event.scheduler_count(),
                groups: event.spawn_groups().len(),
                entities: event.spawned_entities().len(),
                failures: event.failures(),
            })
            .collect();
        Self {
            region: manager.region(),
            live_entities: world.live_entity_count(),
            events,
        }
    }
}

#[derive(Debug, Serialize)]
struct SnapshotFile<'a> {
    scenario: &'a str,
    tick: u64,
    elapsed_ms: u64,
    written_at: DateTime<Utc>,
    regions: &'a [RegionSnapshot],
}

pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval_ticks: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl AsRef<Path>, interval_ticks: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval_ticks,
        }
    }

    pub fn should_write(&self, tick: u64) -> bool {
        self.interval_ticks != 0 && tick != 0 && tick % self.interval_ticks == 0
    }

    /// Writes `<dir>/<scenario>/tick_NNNNNN.json` on interval ticks.
    pub fn maybe_write(
        &self,
        tick: u64,
        elapsed_ms: u64,
        scenario_name: &str,
        regions: &[RegionSnapshot],
    ) -> Result<Option<PathBuf>> {
        if !self.should_write(tick) {
            return Ok(None);
        }

        let dir = self.output_dir.join(scenario_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        let path = dir.join(format!("tick_{tick:06}.json"));
        let file = SnapshotFile {
            scenario: scenario_name,
            tick,
            elapsed_ms,
            written_at: Utc::now(),
            regions,
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_gates_snapshots() {
        let writer = SnapshotWriter::new("unused", 30);
        assert!(!writer.should_write(0));
        assert!(!writer.should_write(29));
        assert!(writer.should_write(30));
        assert!(!writer.should_write(31));
        assert!(!SnapshotWriter::new("unused", 0).should_write(30));
    }

    #[test]
    fn writes_json_under_scenario_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), 2);
        let regions = vec![RegionSnapshot {
            region: RegionId(4),
            live_entities: 7,
            events: Vec::new(),
        }];

        assert!(writer.maybe_write(1, 100, "demo", &regions).unwrap().is_none());
        let path = writer.maybe_write(2, 200, "demo", &regions).unwrap().unwrap();
        assert_eq!(path, dir.path().join("demo").join("tick_000002.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["tick"], 2);
        assert_eq!(value["regions"][0]["region"], 4);
        assert_eq!(value["regions"][0]["live_entities"], 7);
    }
}
