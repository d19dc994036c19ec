//! Local directory document source.

use super::DocumentSource;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Reads every regular file directly under a directory.
///
/// Names are returned sorted so repeated runs assign the same row order.
pub struct LocalDirSource {
    root: PathBuf,
    bucket: String,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let bucket = root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        Self { root, bucket }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(AppError::DocumentSource {
                message: format!("Refusing to read outside {}: {}", self.root.display(), name),
            });
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl DocumentSource for LocalDirSource {
    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        Ok(tokio::fs::read(&path).await?)
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn endpoint(&self) -> &str {
        "local"
    }

    fn canonical_path(&self, name: &str) -> String {
        format!("file://{}", self.root.join(name).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tokio_test::{assert_err, assert_ok};

    /// Fresh directory under the system temp dir, unique per test
    async fn scratch_dir(test: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lorehunt-{}-{}", test, std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        tokio::fs::create_dir_all(dir.join("nested")).await.unwrap();
        for (name, content) in files {
            tokio::fs::write(dir.join(name), content).await.unwrap();
        }
        dir
    }

    async fn cleanup(dir: &Path) {
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn test_list_sorted_files_only() {
        let dir = scratch_dir("list", &[("tangier.txt", "b"), ("ceuta.txt", "c"), ("fez.txt", "a")]).await;
        let source = LocalDirSource::new(&dir);

        let names = assert_ok!(source.list().await);
        assert_eq!(names, vec!["ceuta.txt", "fez.txt", "tangier.txt"]);

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_fetch_reads_content_and_provenance() {
        let dir = scratch_dir("fetch", &[("fez.txt", "The caravan left at dawn.")]).await;
        let source = LocalDirSource::new(&dir);

        let document = assert_ok!(source.fetch("fez.txt").await);
        assert_eq!(document.bytes(), b"The caravan left at dawn.");

        let provenance = document.provenance();
        assert_eq!(provenance.source, "fez.txt");
        assert_eq!(provenance.minio_path, format!("file://{}", dir.join("fez.txt").display()));
        assert_eq!(provenance.bucket, source.bucket());
        assert!(dir.ends_with(&provenance.bucket));
        assert_eq!(provenance.endpoint, "local");

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_names_outside_root_rejected() {
        let dir = scratch_dir("escape", &[("fez.txt", "a")]).await;
        let source = LocalDirSource::new(&dir);

        for name in ["../fez.txt", "nested/fez.txt", "nested\\fez.txt", ".."] {
            let err = assert_err!(source.read(name).await);
            assert!(matches!(err, AppError::DocumentSource { .. }), "accepted {}", name);
        }

        cleanup(&dir).await;
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = scratch_dir("missing", &[]).await;
        let source = LocalDirSource::new(&dir);

        assert_err!(source.read("absent.txt").await);
        assert!(assert_ok!(source.list().await).is_empty());

        cleanup(&dir).await;
    }
}
