// Vote counter persistence
// Keeps the two keyword tallies in a single JSON file that is rewritten whole

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Persisted tallies, stored as `{"jopi": n, "doki": n}`
#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    pub jopi: u64,
    pub doki: u64,
}

impl CounterRecord {
    pub fn bump(&mut self, vote: Vote) {
        match vote {
            Vote::Jopi => self.jopi = self.jopi.saturating_add(1),
            Vote::Doki => self.doki = self.doki.saturating_add(1),
        }
    }
}

/// Keyword recognised in a message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Jopi,
    Doki,
}

impl Vote {
    /// Case-insensitive keyword lookup. "JOPI" is checked first and wins when
    /// both keywords appear.
    pub fn detect(message: &str) -> Option<Self> {
        let upper = message.to_uppercase();
        if upper.contains("JOPI") {
            Some(Self::Jopi)
        } else if upper.contains("DOKI") {
            Some(Self::Doki)
        } else {
            None
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jopi => "jopi",
            Self::Doki => "doki",
        }
    }
}

/// Result of a stats read: the record plus an advisory error when the file
/// could not be used
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    #[serde(flatten)]
    pub record: CounterRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize counters: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// File-backed counter store
///
/// All access inside the process goes through one async mutex, so increments
/// from concurrent requests are applied one after another. Other processes
/// writing the same file are not coordinated with.
pub struct CounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current tallies. A missing file reads as zeros; an unreadable or
    /// malformed one reads as zeros with the failure attached.
    pub async fn read(&self) -> CounterSnapshot {
        let _guard = self.lock.lock().await;
        match self.load().await {
            Ok(record) => CounterSnapshot {
                record,
                error: None,
            },
            Err(e) => {
                tracing::error!(error = %e, "Error reading stats");
                CounterSnapshot {
                    record: CounterRecord::default(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Count a vote found in `message`, if any.
    ///
    /// Storage failures are logged and swallowed; the returned record is the
    /// one written to disk, `None` when nothing was written.
    pub async fn increment_for(&self, message: &str) -> Option<CounterRecord> {
        let vote = Vote::detect(message)?;
        let _guard = self.lock.lock().await;

        match self.apply(vote).await {
            Ok(record) => {
                tracing::info!(
                    vote = vote.as_str(),
                    jopi = record.jopi,
                    doki = record.doki,
                    "Updated stats"
                );
                Some(record)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not update vote counters");
                None
            }
        }
    }

    async fn apply(&self, vote: Vote) -> Result<CounterRecord, StorageError> {
        let mut record = self.load().await?;
        record.bump(vote);
        self.save(&record).await?;
        Ok(record)
    }

    async fn load(&self) -> Result<CounterRecord, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|source| StorageError::Parse {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CounterRecord::default()),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn save(&self, record: &CounterRecord) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(record).map_err(StorageError::Serialize)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| StorageError::Write {
                path: self.path.clone(),
                source,
            })
    }
}
