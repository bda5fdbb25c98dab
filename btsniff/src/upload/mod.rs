pub mod models;
pub mod wigle;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

pub use models::{PassReport, UploadState};
use models::{Claim, TaskMap};

#[derive(Debug, thiserror::Error)]
pub enum UploadConfigError {
    #[error("upload credentials are not configured (wigle_name / wigle_api_token)")]
    MissingCredentials,

    #[error("upload directory {path} is unusable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// The remote API finalized files are submitted to.
#[async_trait]
pub trait UploadBackend: Send + Sync + 'static {
    /// Error type specific to this backend
    type Error: std::error::Error + Send + Sync + 'static;

    /// Submit one file. `Ok` means the remote side acknowledged receipt.
    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<(), Self::Error>;

    /// Cheap reachability probe run before a pass when enabled.
    async fn reachable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory holding finalized files.
    pub path: PathBuf,
    /// Archive directory for uploaded files that are not removed.
    pub uploaded_path: Option<PathBuf>,
    pub remove_on_success: bool,
    pub check_connectivity: bool,
}

/// Watches the upload directory and pushes every finalized file to the
/// backend, applying the retention policy per outcome.
///
/// Clones share the per-file state, so passes started from different
/// tasks never submit the same file twice at once.
pub struct UploadQueue<B> {
    config: UploadConfig,
    backend: Arc<B>,
    tasks: TaskMap,
}

impl<B> Clone for UploadQueue<B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: Arc::clone(&self.backend),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<B: UploadBackend> UploadQueue<B> {
    pub fn new(config: UploadConfig, backend: B) -> Result<Self, UploadConfigError> {
        for dir in std::iter::once(&config.path).chain(config.uploaded_path.iter()) {
            std::fs::create_dir_all(dir).map_err(|source| UploadConfigError::Directory {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            config,
            backend: Arc::new(backend),
            tasks: TaskMap::default(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.config.path
    }

    /// Current state of a file known to the queue.
    pub fn state(&self, path: &Path) -> Option<UploadState> {
        let map = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(path).copied()
    }

    /// Finalized files currently waiting, oldest first.
    pub async fn pending_files(&self) -> Vec<PathBuf> {
        match list_csv_files(&self.config.path).await {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %self.config.path.display(), error = %e, "Cannot list upload directory");
                Vec::new()
            }
        }
    }

    /// Run one pass over the upload directory.
    #[instrument(name = "upload_pass", skip(self), fields(path = %self.config.path.display()))]
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::default();

        if self.config.check_connectivity && !self.backend.reachable().await {
            debug!("Upload API unreachable, will retry later");
            report.offline = true;
            report.remaining = self.pending_files().await.len();
            return report;
        }

        let files = self.pending_files().await;
        self.track(&files);
        if files.is_empty() {
            debug!("No files to upload");
            return report;
        }

        info!(files = files.len(), "Starting upload pass");
        for path in files {
            let Some(claim) = Claim::acquire(&self.tasks, path.clone()) else {
                debug!(path = %path.display(), "Upload already in flight");
                report.skipped += 1;
                continue;
            };

            let contents = match tokio::fs::read(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "File consumed by an earlier pass");
                    claim.forget();
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Cannot read file for upload");
                    claim.finish(UploadState::Failed);
                    report.failed += 1;
                    continue;
                }
            };

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            report.attempted += 1;
            match self.backend.upload(&file_name, contents).await {
                Ok(()) => {
                    info!(file = %file_name, "Upload successful");
                    report.succeeded += 1;
                    if self.retain_uploaded(&path).await {
                        claim.finish(UploadState::Succeeded);
                    } else {
                        claim.forget();
                    }
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Upload failed, will retry next pass");
                    report.failed += 1;
                    claim.finish(UploadState::Failed);
                }
            }
        }

        report.remaining = self.pending_files().await.len();
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            remaining = report.remaining,
            "Upload pass complete"
        );
        report
    }

    /// Apply the retention policy to an uploaded file. Returns true when the
    /// file is still in the upload directory afterwards.
    async fn retain_uploaded(&self, path: &Path) -> bool {
        if self.config.remove_on_success {
            return match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Deleted uploaded file");
                    false
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to delete uploaded file");
                    true
                }
            };
        }

        if let Some(archive) = &self.config.uploaded_path
            && let Some(name) = path.file_name()
        {
            let dest = archive.join(name);
            return match tokio::fs::rename(path, &dest).await {
                Ok(()) => {
                    debug!(to = %dest.display(), "Moved uploaded file");
                    false
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to move uploaded file");
                    true
                }
            };
        }

        // Kept in place: offered again on later passes.
        true
    }

    /// Register newly seen files as pending and forget files that vanished.
    fn track(&self, files: &[PathBuf]) {
        let listed: HashSet<&PathBuf> = files.iter().collect();
        let mut map = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        map.retain(|path, state| *state == UploadState::Uploading || listed.contains(path));
        for path in files {
            map.entry(path.clone()).or_insert(UploadState::Pending);
        }
    }
}

/// Regular `*.csv` files in `dir`, oldest modification first.
async fn list_csv_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }

        // Entries can disappear between listing and stat.
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if meta.is_file() {
            files.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
        }
    }

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
