use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Upload state of a finalized file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadState {
    Pending,
    Uploading,
    Succeeded,
    Failed,
}

/// Outcome of one pass over the upload directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Files handed to the backend.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Files in flight elsewhere or gone before they could be read.
    pub skipped: usize,
    /// Files still waiting in the directory after the pass.
    pub remaining: usize,
    /// The pass was skipped because the API was unreachable.
    pub offline: bool,
}

pub(crate) type TaskMap = Arc<Mutex<HashMap<PathBuf, UploadState>>>;

/// Exclusive right to upload one file.
///
/// Dropping the claim without finishing it marks the file `Failed`, so an
/// abandoned attempt is retried on the next pass.
pub(crate) struct Claim {
    tasks: TaskMap,
    path: PathBuf,
    outcome: Option<UploadState>,
}

impl Claim {
    /// Move `path` to `Uploading` unless another attempt already holds it.
    pub(crate) fn acquire(tasks: &TaskMap, path: PathBuf) -> Option<Self> {
        let mut map = tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let state = map.entry(path.clone()).or_insert(UploadState::Pending);
        if *state == UploadState::Uploading {
            return None;
        }
        *state = UploadState::Uploading;

        Some(Self {
            tasks: Arc::clone(tasks),
            path,
            outcome: Some(UploadState::Failed),
        })
    }

    pub(crate) fn finish(mut self, state: UploadState) {
        self.outcome = Some(state);
    }

    /// The file left the upload directory; forget about it.
    pub(crate) fn forget(mut self) {
        self.outcome = None;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut map = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        match self.outcome {
            Some(state) => {
                map.insert(self.path.clone(), state);
            }
            None => {
                map.remove(&self.path);
            }
        }
    }
}
