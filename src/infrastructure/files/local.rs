//! Filesystem-backed file loader

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::files::FileLoader;
use crate::domain::DomainError;

/// Reads files from local disk relative to a base directory
#[derive(Debug, Clone)]
pub struct LocalFileLoader {
    base_path: PathBuf,
}

impl LocalFileLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Default for LocalFileLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

#[async_trait]
impl FileLoader for LocalFileLoader {
    fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, DomainError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| DomainError::file_load(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_relative_to_base_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "hello").unwrap();

        let loader = LocalFileLoader::new(dir.path());
        let path = loader.resolve("input.txt");
        assert_eq!(loader.read_bytes(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_absolute_paths_ignore_base() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abs.txt");
        std::fs::write(&file, "x").unwrap();

        let loader = LocalFileLoader::new("/nonexistent");
        assert_eq!(loader.resolve(file.to_str().unwrap()), file);
    }

    #[tokio::test]
    async fn test_missing_file_is_file_load_error() {
        let loader = LocalFileLoader::new(".");
        let err = loader
            .read_bytes(Path::new("definitely-missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::FileLoad { .. }));
    }
}
