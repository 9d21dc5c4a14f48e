use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::job::DownloadJob;

const STATE_VERSION: u32 = 1;

/// Root object of the state file
#[derive(Debug, Serialize, Deserialize)]
struct StateFileData {
    version: u32,
    jobs: Vec<DownloadJob>,
}

/// On-disk queue state: an ordered list of job records in one JSON file
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all jobs, replacing the previous file atomically
    pub fn save(&self, jobs: &[DownloadJob]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory {:?}", parent))?;
        }

        let data = StateFileData {
            version: STATE_VERSION,
            jobs: jobs.to_vec(),
        };
        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize download state")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, contents)
            .with_context(|| format!("Failed to write {:?}", temp_path))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;

        debug!("Saved {} download jobs to {:?}", jobs.len(), self.path);
        Ok(())
    }

    /// Read all jobs. A missing file is an empty queue.
    pub fn load(&self) -> Result<Vec<DownloadJob>> {
        if !self.path.exists() {
            debug!("No download state at {:?}", self.path);
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let data: StateFileData =
            serde_json::from_str(&contents).context("Failed to parse download state")?;

        if data.version != STATE_VERSION {
            return Err(anyhow::anyhow!(
                "Unsupported download state version {}",
                data.version
            ));
        }

        debug!("Loaded {} download jobs from {:?}", data.jobs.len(), self.path);
        Ok(data.jobs)
    }
}
