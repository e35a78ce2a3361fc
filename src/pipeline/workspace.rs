use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CiError;

/// Exclusive handle on the fixed working directory for one pipeline run.
///
/// `release` removes the directory; if the guard is dropped without being
/// released (early return, panic) the directory is removed in `Drop`.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Clear any leftover directory from an earlier run and make sure the
    /// parent exists, so the clone can create `path` itself.
    pub async fn prepare(path: &Path) -> Result<Self, CiError> {
        remove_if_present(path).await?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn release(mut self) -> Result<(), CiError> {
        self.released = true;
        remove_if_present(&self.path).await
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::warn!("Working directory {} removed on unwind", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                "Could not remove working directory {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<(), CiError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_removes_stale_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("to_build");
        std::fs::create_dir_all(path.join("leftover")).unwrap();

        let ws = Workspace::prepare(&path).await.unwrap();
        assert!(!path.exists());
        assert_eq!(ws.path(), path.as_path());
        ws.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("a").join("to_build");

        let ws = Workspace::prepare(&path).await.unwrap();
        std::fs::create_dir_all(path.join("src")).unwrap();
        ws.release().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_release_without_directory_is_ok() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::prepare(&root.path().join("never_cloned")).await.unwrap();
        ws.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("to_build");
        {
            let _ws = Workspace::prepare(&path).await.unwrap();
            std::fs::create_dir_all(path.join("src")).unwrap();
        }
        assert!(!path.exists());
    }
}
