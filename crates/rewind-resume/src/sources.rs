//! Collaborators that supply run metadata and log content.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::SourceError;

/// What is known about the run being resumed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunMetadata {
    /// Run identifier.
    pub run_id: String,
    /// Where the run log lives. `None` means nothing was recorded.
    pub log_location: Option<String>,
}

impl RunMetadata {
    /// Log location, treating an empty string as absent.
    pub fn location(&self) -> Option<&str> {
        self.log_location.as_deref().filter(|l| !l.trim().is_empty())
    }
}

/// Looks up metadata for the run being resumed.
#[async_trait]
pub trait RunMetadataSource: Send + Sync {
    /// Fetch run metadata.
    async fn fetch_metadata(&self) -> Result<RunMetadata, SourceError>;
}

/// Reads raw log content from a location.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the whole log at `location`. Missing logs read as empty.
    async fn fetch_log(&self, location: &str) -> Result<String, SourceError>;
}

/// Metadata known up front.
#[derive(Clone, Debug, Default)]
pub struct StaticRunMetadata(pub RunMetadata);

#[async_trait]
impl RunMetadataSource for StaticRunMetadata {
    async fn fetch_metadata(&self) -> Result<RunMetadata, SourceError> {
        Ok(self.0.clone())
    }
}

/// Reads logs from the local filesystem.
///
/// Relative locations resolve against `base_dir` when one is set.
#[derive(Clone, Debug, Default)]
pub struct FsLogSource {
    base_dir: Option<PathBuf>,
}

impl FsLogSource {
    /// Source resolving relative locations against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let raw = location.strip_prefix("file://").unwrap_or(location);
        let path = Path::new(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl LogSource for FsLogSource {
    async fn fetch_log(&self, location: &str) -> Result<String, SourceError> {
        let path = self.resolve(location);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "run log not found, treating as empty");
                Ok(String::new())
            }
            Err(source) => Err(SourceError::Io {
                location: location.to_owned(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn empty_location_is_absent() {
        let meta = RunMetadata {
            run_id: "r1".into(),
            log_location: Some("  ".into()),
        };
        assert_eq!(meta.location(), None);
        assert_eq!(RunMetadata::default().location(), None);
    }

    #[tokio::test]
    async fn static_metadata_is_returned() {
        let meta = RunMetadata {
            run_id: "r1".into(),
            log_location: Some("r1.jsonl".into()),
        };
        let source = StaticRunMetadata(meta.clone());
        assert_eq!(source.fetch_metadata().await.unwrap(), meta);
    }

    #[tokio::test]
    async fn reads_relative_and_file_url_locations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r1.jsonl"), "line\n").unwrap();
        let source = FsLogSource::new(dir.path());
        assert_eq!(source.fetch_log("r1.jsonl").await.unwrap(), "line\n");

        let url = format!("file://{}", dir.path().join("r1.jsonl").display());
        assert_eq!(FsLogSource::default().fetch_log(&url).await.unwrap(), "line\n");
    }

    #[tokio::test]
    async fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsLogSource::new(dir.path());
        assert_eq!(source.fetch_log("missing.jsonl").await.unwrap(), "");
    }

    #[tokio::test]
    async fn directory_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsLogSource::default();
        let location = dir.path().display().to_string();
        assert_matches!(
            source.fetch_log(&location).await,
            Err(SourceError::Io { .. })
        );
    }
}
