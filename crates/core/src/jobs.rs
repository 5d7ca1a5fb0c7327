use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Store key the conversion queue is handed off under
pub const QUEUE_KEY: &str = "filesBeingProcessed";

/// One queued conversion as handed from planning to the runner.
///
/// The short wire names (`com`, `in`, `len`) keep the store readable by
/// older front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    #[serde(rename = "com")]
    pub command: String,
    #[serde(rename = "in")]
    pub input: PathBuf,
    pub output: PathBuf,
    /// Input duration in microseconds
    #[serde(rename = "len")]
    pub length_us: u64,
}

impl QueueEntry {
    pub fn new(command: String, input: PathBuf, output: PathBuf, length_us: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command,
            input,
            output,
            length_us,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub command: String,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub status: JobStatus,
    pub exit_code: Option<i32>,
    /// stderr of a failed run
    pub log_path: Option<PathBuf>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }
}

pub fn create_job(entry: &QueueEntry) -> Job {
    Job {
        id: entry.id.clone(),
        input: entry.input.clone(),
        output: entry.output.clone(),
        command: entry.command.clone(),
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        status: JobStatus::Pending,
        exit_code: None,
        log_path: None,
        reason: None,
    }
}

pub fn update_job_status(job: &mut Job, status: JobStatus) {
    job.status = status;
    match status {
        JobStatus::Running => job.started_at = Some(Utc::now()),
        JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled => {
            job.finished_at = Some(Utc::now())
        }
        JobStatus::Pending => {}
    }
}

/// Minimal key-value persistence used for the queue hand-off
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Key-value store backed by a single JSON object on disk.
///
/// Every write rewrites the whole file through a temporary file and a
/// rename, so a crash never leaves a half-written store behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store {:?}", self.path))?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents)
            .with_context(|| format!("Failed to parse store {:?}", self.path))?
        {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!(
                "Store {:?} holds {} instead of an object",
                self.path,
                json_kind(&other)
            ),
        }
    }

    fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
        use std::fs;
        use std::io::Write;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(map)?;
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_file = PathBuf::from(temp_name);

        let mut file = fs::File::create(&temp_file)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_file, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut map = self.read_all()?;
        map.insert(key.to_string(), value);
        self.write_all(&map)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut map = self.read_all()?;
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn save_queue(store: &mut dyn KeyValueStore, entries: &[QueueEntry]) -> Result<()> {
    store.set(QUEUE_KEY, serde_json::to_value(entries)?)?;
    debug!("Saved {} queued conversions", entries.len());
    Ok(())
}

/// Queue previously saved with [`save_queue`]; empty when nothing is queued.
///
/// Entries that no longer parse are skipped with a warning so one bad record
/// does not strand the rest of the queue.
pub fn load_queue(store: &dyn KeyValueStore) -> Result<Vec<QueueEntry>> {
    let items = match store.get(QUEUE_KEY)? {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => anyhow::bail!("{} holds {} instead of a list", QUEUE_KEY, json_kind(&other)),
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<QueueEntry>(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("Skipping unreadable queue entry: {}", e),
        }
    }
    Ok(entries)
}

pub fn clear_queue(store: &mut dyn KeyValueStore) -> Result<()> {
    store.remove(QUEUE_KEY)
}
