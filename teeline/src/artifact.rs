//! Evidence artifacts: screenshots and logs produced during an attempt.
//!
//! Artifacts live in an external blob store under one folder per
//! reservation, with an `attempt_{n}` subfolder per claim. The engine only
//! needs the narrow interface here; backends live with the control layer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reservation::ReservationKey;

/// Opaque pointer to one reservation's evidence folder. Allocated on the
/// first claim and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactFolder(String);

impl ArtifactFolder {
    pub fn for_reservation(key: &ReservationKey) -> Self {
        ArtifactFolder(key.as_str().to_string())
    }

    /// Rehydrate a folder reference the store previously persisted.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        ArtifactFolder(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a single artifact: `{folder}/attempt_{n}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub folder: ArtifactFolder,
    pub attempt: u32,
    pub name: String,
}

impl ArtifactRef {
    pub fn path(&self) -> String {
        format!("{}/attempt_{}/{}", self.folder, self.attempt, self.name)
    }
}

/// One artifact as seen in a folder listing.
#[derive(Debug, Clone, Serialize)]
pub struct StoredArtifact {
    pub attempt: u32,
    pub name: String,
    pub content_type: String,
    pub size_bytes: usize,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store one artifact, overwriting any previous upload at the same path.
    async fn upload(&self, reference: &ArtifactRef, content_type: &str, bytes: Vec<u8>) -> Result<()>;

    /// Everything uploaded under a reservation's folder, all attempts.
    async fn list(&self, folder: &ArtifactFolder) -> Result<Vec<StoredArtifact>>;

    /// Fetch one artifact's content type and bytes, if present.
    async fn fetch(&self, reference: &ArtifactRef) -> Result<Option<(String, Vec<u8>)>>;
}

/// Per-attempt evidence context, built by the runner and handed to the
/// automation agent. Owns the screenshot sequence counter and the attempt
/// log, so nothing about an attempt leaks into process-wide state.
pub struct AttemptContext {
    folder: ArtifactFolder,
    attempt: u32,
    store: Arc<dyn ArtifactStore>,
    sequence: AtomicU32,
    log: Mutex<AttemptLog>,
}

impl AttemptContext {
    pub fn new(folder: ArtifactFolder, attempt: u32, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            folder,
            attempt,
            store,
            sequence: AtomicU32::new(0),
            log: Mutex::new(AttemptLog::started(Utc::now())),
        }
    }

    pub fn folder(&self) -> &ArtifactFolder {
        &self.folder
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Append a timestamped line to the attempt log.
    pub fn log(&self, message: impl AsRef<str>) {
        let mut log = self.log.lock().expect("attempt log poisoned");
        log.push(Utc::now(), message.as_ref());
    }

    /// Record a step with its wall-clock duration.
    pub fn log_duration(&self, label: &str, started: DateTime<Utc>, finished: DateTime<Utc>) {
        let ms = (finished - started).num_milliseconds();
        self.log(format!("{label} took {ms} ms"));
    }

    /// Upload a screenshot into this attempt's folder. Names are sequenced
    /// so the gallery can show them in capture order.
    pub async fn save_screenshot(&self, label: &str, bytes: Vec<u8>) -> Result<String> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!("{seq:02}_{label}.png");
        let reference = ArtifactRef {
            folder: self.folder.clone(),
            attempt: self.attempt,
            name: name.clone(),
        };
        self.store.upload(&reference, "image/png", bytes).await?;
        self.log(format!("screenshot {name}"));
        Ok(name)
    }

    /// Flush the attempt log to the artifact store. Called once, after the
    /// agent returns; losing the log must not fail the attempt itself.
    pub async fn finish(&self) -> Result<()> {
        let rendered = {
            let mut log = self.log.lock().expect("attempt log poisoned");
            log.push(Utc::now(), "attempt finished");
            log.render()
        };
        let reference = ArtifactRef {
            folder: self.folder.clone(),
            attempt: self.attempt,
            name: format!("attempt_{}.log", self.attempt),
        };
        self.store
            .upload(&reference, "text/plain; charset=utf-8", rendered.into_bytes())
            .await
    }
}

/// Millisecond-resolution attempt log, buffered in memory and uploaded as
/// one artifact at the end of the attempt.
#[derive(Debug)]
struct AttemptLog {
    started: DateTime<Utc>,
    lines: Vec<String>,
}

impl AttemptLog {
    fn started(now: DateTime<Utc>) -> Self {
        Self {
            started: now,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, now: DateTime<Utc>, message: &str) {
        self.lines
            .push(format!("[{}] {message}", now.format("%Y-%m-%d %H:%M:%S%.3f")));
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Attempt log started {}\n",
            self.started.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        ));
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// In-memory artifact backend for tests and development runs.
#[derive(Default)]
pub struct MemoryArtifactStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(&self, reference: &ArtifactRef, content_type: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs
            .insert(reference.path(), (content_type.to_string(), bytes));
        Ok(())
    }

    async fn list(&self, folder: &ArtifactFolder) -> Result<Vec<StoredArtifact>> {
        let prefix = format!("{}/", folder.as_str());
        let mut artifacts = Vec::new();
        for entry in self.blobs.iter() {
            let Some(rest) = entry.key().strip_prefix(&prefix) else {
                continue;
            };
            let Some((attempt_dir, name)) = rest.split_once('/') else {
                continue;
            };
            let Some(attempt) = attempt_dir
                .strip_prefix("attempt_")
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            artifacts.push(StoredArtifact {
                attempt,
                name: name.to_string(),
                content_type: entry.value().0.clone(),
                size_bytes: entry.value().1.len(),
            });
        }
        artifacts.sort_by(|a, b| (a.attempt, a.name.clone()).cmp(&(b.attempt, b.name.clone())));
        Ok(artifacts)
    }

    async fn fetch(&self, reference: &ArtifactRef) -> Result<Option<(String, Vec<u8>)>> {
        Ok(self.blobs.get(&reference.path()).map(|v| v.value().clone()))
    }
}
