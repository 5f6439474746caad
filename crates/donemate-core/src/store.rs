use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::task::{Task, TaskCollection, TaskId};

pub const SCHEMA_VERSION: u32 = 1;

/// String key to string value persistence substrate.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Rc<S> {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        (**self).remove(key)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    reject_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `set` fail, the way a full browser quota does.
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.set(reject);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.reject_writes.get() {
            return Err(anyhow!("storage quota exceeded writing {key}"));
        }
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    tasks: &'a [Task],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPayload {
    Envelope { version: u32, tasks: Vec<Task> },
    Legacy(Vec<LegacyTask>),
}

/// Tasks written before the versioned envelope: a bare JSON array whose ids
/// are numbers or free text.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTask {
    id: LegacyId,
    description: String,
    #[serde(default)]
    packed: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    done_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyId {
    Millis(u64),
    Text(String),
}

impl LegacyTask {
    fn into_task(self, now: DateTime<Utc>) -> Task {
        let id = match self.id {
            LegacyId::Millis(millis) => TaskId::from_legacy(millis),
            LegacyId::Text(text) => TaskId::from_legacy_text(&text),
        };

        Task::restore(
            id,
            self.description,
            self.packed,
            self.created_at.unwrap_or(now),
            self.done_at,
        )
    }
}

/// Encodes the full collection as a versioned envelope.
pub fn encode(tasks: &TaskCollection) -> anyhow::Result<String> {
    let envelope = EnvelopeOut {
        version: SCHEMA_VERSION,
        tasks: tasks.as_slice(),
    };
    serde_json::to_string(&envelope).context("failed to serialize tasks")
}

/// Decodes a stored payload, accepting the current envelope and the legacy
/// bare array.
pub fn decode(raw: &str, now: DateTime<Utc>) -> anyhow::Result<TaskCollection> {
    let payload: StoredPayload =
        serde_json::from_str(raw).context("stored tasks are not a recognized payload")?;

    let tasks = match payload {
        StoredPayload::Envelope { version, tasks } => {
            if version > SCHEMA_VERSION {
                return Err(anyhow!(
                    "stored tasks use schema version {version}, newest known is {SCHEMA_VERSION}"
                ));
            }
            tasks
        }
        StoredPayload::Legacy(items) => {
            debug!(count = items.len(), "upgrading legacy task payload");
            items.into_iter().map(|item| item.into_task(now)).collect()
        }
    };

    Ok(TaskCollection::from_loaded(tasks))
}

/// The task collection's durable copy under one configured key.
///
/// Reads never fail: absence or corruption yields the empty collection.
/// Writes are best-effort: failures are logged and swallowed.
#[derive(Debug)]
pub struct DurableStore<S> {
    backend: S,
    key: String,
}

impl<S: KeyValueStore> DurableStore<S> {
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub fn load(&self) -> TaskCollection {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => {
                debug!("no stored tasks; starting empty");
                return TaskCollection::default();
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "failed reading stored tasks; starting empty");
                return TaskCollection::default();
            }
        };

        match decode(&raw, Utc::now()) {
            Ok(tasks) => {
                debug!(count = tasks.len(), "loaded stored tasks");
                tasks
            }
            Err(error) => {
                warn!(error = %format!("{error:#}"), "discarding unreadable stored tasks");
                TaskCollection::default()
            }
        }
    }

    #[tracing::instrument(skip(self, tasks), fields(key = %self.key, count = tasks.len()))]
    pub fn save(&self, tasks: &TaskCollection) {
        if let Err(error) = self.try_save(tasks) {
            warn!(error = %format!("{error:#}"), "failed to persist tasks; keeping in-memory state");
        }
    }

    pub fn try_save(&self, tasks: &TaskCollection) -> anyhow::Result<()> {
        let json = encode(tasks)?;
        self.backend
            .set(&self.key, &json)
            .with_context(|| format!("failed to write {}", self.key))
    }
}

#[cfg(feature = "native")]
pub use file::FileStore;

#[cfg(feature = "native")]
mod file {
    use std::fs;
    use std::io::{ErrorKind, Write};
    use std::path::{Path, PathBuf};

    use anyhow::{Context, anyhow};
    use tempfile::NamedTempFile;
    use tracing::{debug, info};

    use super::KeyValueStore;

    /// One JSON file per key inside a data directory. Writes replace the
    /// file atomically.
    #[derive(Debug, Clone)]
    pub struct FileStore {
        dir: PathBuf,
    }

    impl FileStore {
        #[tracing::instrument(skip(dir))]
        pub fn open(dir: &Path) -> anyhow::Result<Self> {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            info!(data_dir = %dir.display(), "opened file store");
            Ok(Self {
                dir: dir.to_path_buf(),
            })
        }

        /// File backing `key`. Keys map one to one onto file names, so any
        /// key that would need rewriting to be a safe name is refused.
        pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
            let valid = !key.is_empty()
                && !key.starts_with('.')
                && key
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_'));
            if !valid {
                return Err(anyhow!(
                    "storage key {key:?} must be ASCII letters, digits, '.', '-' or '_' and not start with '.'"
                ));
            }
            Ok(self.dir.join(format!("{key}.json")))
        }
    }

    impl KeyValueStore for FileStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            let path = self.path_for(key)?;
            match fs::read_to_string(&path) {
                Ok(text) => Ok(Some(text)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
            }
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            let path = self.path_for(key)?;
            debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

            let mut temp = NamedTempFile::new_in(&self.dir)?;
            temp.write_all(value.as_bytes())?;
            temp.flush()?;
            temp.persist(&path)
                .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
            Ok(())
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            let path = self.path_for(key)?;
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
            }
        }
    }
}
