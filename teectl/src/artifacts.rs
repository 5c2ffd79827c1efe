//! Local-filesystem artifact backend.
//!
//! Stores attempt evidence under `{root}/{folder}/attempt_{n}/{name}`,
//! matching the folder convention the engine's `ArtifactRef` encodes.
//! Suitable for single-host deployments; swap in an object-store backend
//! behind the same trait if the evidence needs to outlive the host.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use teeline::artifact::{ArtifactFolder, ArtifactRef, ArtifactStore, StoredArtifact};
use teeline::error::{Error, Result};

pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Join a relative artifact path under the root, refusing anything
    /// that could escape it.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let candidate = Path::new(relative);
        let escapes = candidate.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if escapes {
            return Err(Error::Artifact(anyhow::anyhow!(
                "artifact path {relative:?} escapes the storage root"
            )));
        }
        Ok(self.root.join(candidate))
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::Artifact(anyhow::Error::new(e))
}

fn content_type_of(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, reference: &ArtifactRef, _content_type: &str, bytes: Vec<u8>) -> Result<()> {
        let full_path = self.resolve(&reference.path())?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut file = fs::File::create(&full_path).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        Ok(())
    }

    async fn list(&self, folder: &ArtifactFolder) -> Result<Vec<StoredArtifact>> {
        let folder_path = self.resolve(folder.as_str())?;
        let mut artifacts = Vec::new();

        let mut attempts = match fs::read_dir(&folder_path).await {
            Ok(entries) => entries,
            // No evidence yet is an empty listing, not an error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(artifacts),
            Err(e) => return Err(io_err(e)),
        };

        while let Some(attempt_dir) = attempts.next_entry().await.map_err(io_err)? {
            let dir_name = attempt_dir.file_name();
            let Some(attempt) = dir_name
                .to_str()
                .and_then(|n| n.strip_prefix("attempt_"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let mut files = fs::read_dir(attempt_dir.path()).await.map_err(io_err)?;
            while let Some(file) = files.next_entry().await.map_err(io_err)? {
                let Some(name) = file.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let size_bytes = file.metadata().await.map_err(io_err)?.len() as usize;
                artifacts.push(StoredArtifact {
                    attempt,
                    content_type: content_type_of(&name),
                    name,
                    size_bytes,
                });
            }
        }

        artifacts.sort_by(|a, b| (a.attempt, a.name.clone()).cmp(&(b.attempt, b.name.clone())));
        Ok(artifacts)
    }

    async fn fetch(&self, reference: &ArtifactRef) -> Result<Option<(String, Vec<u8>)>> {
        let full_path = self.resolve(&reference.path())?;

        match fs::read(&full_path).await {
            Ok(bytes) => Ok(Some((content_type_of(&reference.name), bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> ArtifactRef {
        ArtifactRef {
            folder: ArtifactFolder::from_raw("2025-06-01_10:00"),
            attempt: 1,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn round_trips_an_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());

        store
            .upload(&reference("00_login.png"), "image/png", vec![1, 2, 3])
            .await
            .unwrap();

        let (content_type, bytes) = store
            .fetch(&reference("00_login.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(bytes, vec![1, 2, 3]);

        let listed = store
            .list(&ArtifactFolder::from_raw("2025-06-01_10:00"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "00_login.png");
        assert_eq!(listed[0].attempt, 1);
    }

    #[tokio::test]
    async fn missing_artifacts_and_folders_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());

        assert!(store.fetch(&reference("nope.png")).await.unwrap().is_none());
        assert!(store
            .list(&ArtifactFolder::from_raw("2099-01-01_08:00"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn traversal_attempts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf());

        let sneaky = ArtifactRef {
            folder: ArtifactFolder::from_raw(".."),
            attempt: 1,
            name: "passwd".into(),
        };
        assert!(store.fetch(&sneaky).await.is_err());
    }
}
