use crate::config::TaskKind;
use crate::error::SinkError;
use crate::sink::JsonLinesSink;
use chrono::Local;
use startreact_core::TrialResult;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const META_FILE: &str = "meta.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const RESULTS_FILE: &str = "trial_results.json";

/// Per-session output directory, named `<date time>_<Task>` under the data root
#[derive(Debug, Clone)]
pub struct SessionDir {
    path: PathBuf,
}

impl SessionDir {
    pub fn create(root: &Path, task: TaskKind) -> Result<Self, SinkError> {
        let stamp = Local::now().format("%Y-%m-%d %H-%M-%S-%6f");
        let path = root.join(format!("{stamp}_{}", task.title()));
        fs::create_dir_all(&path).map_err(|e| SinkError::Io("creating session directory", e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open_sink(&self) -> Result<JsonLinesSink<File>, SinkError> {
        let events = File::create(self.path.join(EVENTS_FILE))
            .map_err(|e| SinkError::Io("creating event log", e))?;
        let meta = File::create(self.path.join(META_FILE))
            .map_err(|e| SinkError::Io("creating metadata file", e))?;
        Ok(JsonLinesSink::new(events, meta))
    }

    pub fn write_results(&self, results: &[TrialResult]) -> Result<PathBuf, SinkError> {
        let path = self.path.join(RESULTS_FILE);
        let file = File::create(&path).map_err(|e| SinkError::Io("creating results file", e))?;
        serde_json::to_writer_pretty(file, results)?;
        Ok(path)
    }
}
