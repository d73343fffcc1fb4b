use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::world::SimulationState;

/// Writes `dir/<scenario>/day_NNNNNN.json` every `interval_days` simulated days.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval_days: u32,
    next_due: i64,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval_days: u32) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval_days,
            next_due: i64::from(interval_days),
        }
    }

    pub fn maybe_write(&mut self, state: &SimulationState) -> Result<Option<PathBuf>> {
        if self.interval_days == 0 {
            return Ok(None);
        }
        let day = state.clock.days_elapsed();
        if day < self.next_due && !state.clock.is_finished() {
            return Ok(None);
        }
        while self.next_due <= day {
            self.next_due += i64::from(self.interval_days);
        }
        self.write(state).map(Some)
    }

    pub fn write(&self, state: &SimulationState) -> Result<PathBuf> {
        let dir = self.dir.join(&state.scenario);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        let path = dir.join(format!("day_{:06}.json", state.clock.days_elapsed()));
        let json = serde_json::to_string_pretty(&state.snapshot())?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
