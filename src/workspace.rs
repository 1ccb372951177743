//! WorkspaceStore owns the scratch directory holding job sources and artifacts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::{CrunnerError, Result};
use crate::id::JobId;

/// How many fresh identifiers to try before giving up on allocation
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// Scratch directory addressed by job identifier.
///
/// Each job owns `{dir}/{id}.c` (source) and `{dir}/{id}.out` (artifact).
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    dir: PathBuf,
}

impl WorkspaceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the workspace directory if it does not exist yet
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            CrunnerError::Workspace(format!("Failed to create {}: {}", self.dir.display(), e))
        })
    }

    pub fn source_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.c", id))
    }

    pub fn artifact_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.out", id))
    }

    pub async fn artifact_exists(&self, id: &JobId) -> bool {
        tokio::fs::metadata(self.artifact_path(id))
            .await
            .is_ok_and(|meta| meta.is_file())
    }

    /// Write source text for `id`.
    ///
    /// The file is created exclusively: an existing file for the same
    /// identifier surfaces as `ErrorKind::AlreadyExists` instead of being
    /// overwritten.
    pub async fn persist_source(&self, id: &JobId, text: &str) -> std::io::Result<PathBuf> {
        let path = self.source_path(id);
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path).await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }

    /// Mint a new identifier and persist `text` under it.
    ///
    /// Retries with a fresh identifier when the generated one is already taken.
    pub async fn allocate(&self, text: &str) -> Result<(JobId, PathBuf)> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let id = JobId::generate();
            match self.persist_source(&id, text).await {
                Ok(path) => return Ok((id, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    log::debug!("Job id {} already taken, regenerating", id);
                    continue;
                }
                Err(e) => {
                    return Err(CrunnerError::Workspace(format!(
                        "Failed to write source for {}: {}",
                        id, e
                    )));
                }
            }
        }
        Err(CrunnerError::Workspace(format!(
            "Could not allocate a unique job id after {} attempts",
            MAX_ALLOCATION_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, WorkspaceStore) {
        let dir = TempDir::new().unwrap();
        let store = WorkspaceStore::new(dir.path().join("ws"));
        store.ensure().unwrap();
        (dir, store)
    }

    #[test]
    fn test_paths_are_addressed_by_id() {
        let store = WorkspaceStore::new("/tmp/c-compiler");
        let id = JobId::parse("1700000000000-deadbeef").unwrap();
        assert_eq!(
            store.source_path(&id),
            PathBuf::from("/tmp/c-compiler/1700000000000-deadbeef.c")
        );
        assert_eq!(
            store.artifact_path(&id),
            PathBuf::from("/tmp/c-compiler/1700000000000-deadbeef.out")
        );
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let (_dir, store) = store();
        store.ensure().unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_persist_source_writes_text() {
        let (_dir, store) = store();
        let id = JobId::generate();
        let path = store.persist_source(&id, "int main(){return 0;}").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "int main(){return 0;}");
    }

    #[tokio::test]
    async fn test_persist_source_refuses_overwrite() {
        let (_dir, store) = store();
        let id = JobId::generate();
        store.persist_source(&id, "first").await.unwrap();
        let err = store.persist_source(&id, "second").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(store.source_path(&id)).unwrap(), "first");
    }

    #[tokio::test]
    async fn test_allocate_returns_distinct_ids() {
        let (_dir, store) = store();
        let (a, path_a) = store.allocate("a").await.unwrap();
        let (b, path_b) = store.allocate("b").await.unwrap();
        assert_ne!(a, b);
        assert_ne!(path_a, path_b);
    }

    #[tokio::test]
    async fn test_allocate_fails_without_directory() {
        let dir = TempDir::new().unwrap();
        let store = WorkspaceStore::new(dir.path().join("missing"));
        let err = store.allocate("int main(){}").await.unwrap_err();
        assert!(matches!(err, CrunnerError::Workspace(_)));
    }

    #[tokio::test]
    async fn test_artifact_exists() {
        let (_dir, store) = store();
        let id = JobId::generate();
        assert!(!store.artifact_exists(&id).await);
        std::fs::write(store.artifact_path(&id), b"bin").unwrap();
        assert!(store.artifact_exists(&id).await);
    }
}
