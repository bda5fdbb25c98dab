use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btsniff::{UploadBackend, UploadConfig, UploadQueue, UploadState};
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("rejected {0}")]
struct Rejected(String);

/// Backend that rejects files whose name contains `bad` while `strict` is
/// set, and records every submission.
#[derive(Clone, Default)]
struct RecordingBackend {
    uploads: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    strict: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl RecordingBackend {
    fn strict() -> Self {
        let backend = Self::default();
        backend.strict.store(true, Ordering::SeqCst);
        backend
    }

    fn names(&self) -> Vec<String> {
        let uploads = self.uploads.lock().unwrap();
        uploads.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[async_trait]
impl UploadBackend for RecordingBackend {
    type Error = Rejected;

    async fn upload(&self, file_name: &str, contents: Vec<u8>) -> Result<(), Rejected> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.uploads
            .lock()
            .unwrap()
            .push((file_name.to_owned(), contents));

        if self.strict.load(Ordering::SeqCst) && file_name.contains("bad") {
            return Err(Rejected(file_name.to_owned()));
        }
        Ok(())
    }

    async fn reachable(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}

fn upload_config(dir: &TempDir) -> UploadConfig {
    UploadConfig {
        path: dir.path().join("toupload"),
        uploaded_path: None,
        remove_on_success: true,
        check_connectivity: false,
    }
}

fn put(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn success_removes_and_failure_retains() {
    let dir = TempDir::new().unwrap();
    let backend = RecordingBackend::strict();
    let queue = UploadQueue::new(upload_config(&dir), backend.clone()).unwrap();
    put(queue.directory(), "good.csv", "MAC\n");
    put(queue.directory(), "bad.csv", "MAC\n");

    let report = queue.run_pass().await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(listing(queue.directory()), vec!["bad.csv"]);
    assert_eq!(
        queue.state(&queue.directory().join("bad.csv")),
        Some(UploadState::Failed)
    );
    assert_eq!(queue.state(&queue.directory().join("good.csv")), None);
}

#[tokio::test]
async fn failed_files_are_retried_next_pass() {
    let dir = TempDir::new().unwrap();
    let backend = RecordingBackend::strict();
    let queue = UploadQueue::new(upload_config(&dir), backend.clone()).unwrap();
    put(queue.directory(), "bad.csv", "MAC\n");

    assert_eq!(queue.run_pass().await.failed, 1);

    backend.strict.store(false, Ordering::SeqCst);
    let report = queue.run_pass().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(backend.names(), vec!["bad.csv", "bad.csv"]);
}

#[tokio::test]
async fn kept_files_are_unchanged() {
    let dir = TempDir::new().unwrap();
    let config = UploadConfig {
        remove_on_success: false,
        ..upload_config(&dir)
    };
    let backend = RecordingBackend::default();
    let queue = UploadQueue::new(config, backend.clone()).unwrap();
    put(queue.directory(), "capture.csv", "MAC,SSID\n11:22:33:44:55:67,\n");

    let report = queue.run_pass().await;

    assert_eq!(report.succeeded, 1);
    let path = queue.directory().join("capture.csv");
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "MAC,SSID\n11:22:33:44:55:67,\n"
    );
    assert_eq!(queue.state(&path), Some(UploadState::Succeeded));

    let uploads = backend.uploads.lock().unwrap();
    assert_eq!(uploads[0].1, b"MAC,SSID\n11:22:33:44:55:67,\n");
}

#[tokio::test]
async fn uploaded_files_move_to_archive() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("uploaded");
    let config = UploadConfig {
        remove_on_success: false,
        uploaded_path: Some(archive.clone()),
        ..upload_config(&dir)
    };
    let backend = RecordingBackend::default();
    let queue = UploadQueue::new(config, backend.clone()).unwrap();
    put(queue.directory(), "capture.csv", "MAC\n");

    queue.run_pass().await;
    let report = queue.run_pass().await;

    assert_eq!(report.attempted, 0);
    assert!(listing(queue.directory()).is_empty());
    assert_eq!(listing(&archive), vec!["capture.csv"]);
    assert_eq!(backend.names().len(), 1);
}

#[tokio::test]
async fn offline_pass_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let config = UploadConfig {
        check_connectivity: true,
        ..upload_config(&dir)
    };
    let backend = RecordingBackend::default();
    backend.offline.store(true, Ordering::SeqCst);
    let queue = UploadQueue::new(config, backend.clone()).unwrap();
    put(queue.directory(), "capture.csv", "MAC\n");

    let report = queue.run_pass().await;

    assert!(report.offline);
    assert_eq!(report.attempted, 0);
    assert_eq!(report.remaining, 1);
    assert!(backend.names().is_empty());
}

#[tokio::test]
async fn only_finalized_csv_files_are_uploaded() {
    let dir = TempDir::new().unwrap();
    let backend = RecordingBackend::default();
    let queue = UploadQueue::new(upload_config(&dir), backend.clone()).unwrap();
    put(queue.directory(), "capture.csv", "MAC\n");
    put(queue.directory(), "capture2.csv.partial", "MAC\n");
    put(queue.directory(), "notes.txt", "hello");
    fs::create_dir(queue.directory().join("nested.csv")).unwrap();

    queue.run_pass().await;

    assert_eq!(backend.names(), vec!["capture.csv"]);
    assert_eq!(
        listing(queue.directory()),
        vec!["capture2.csv.partial", "nested.csv", "notes.txt"]
    );
}

#[tokio::test]
async fn concurrent_passes_upload_each_file_once() {
    let dir = TempDir::new().unwrap();
    let backend = RecordingBackend {
        delay: Some(Duration::from_millis(50)),
        ..RecordingBackend::default()
    };
    let queue = UploadQueue::new(upload_config(&dir), backend.clone()).unwrap();
    put(queue.directory(), "a.csv", "MAC\n");
    put(queue.directory(), "b.csv", "MAC\n");

    let other = queue.clone();
    let (first, second) = tokio::join!(queue.run_pass(), other.run_pass());

    assert_eq!(first.succeeded + second.succeeded, 2);
    let mut names = backend.names();
    names.sort();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
    assert!(listing(queue.directory()).is_empty());
}

#[tokio::test]
async fn empty_directory_is_a_quiet_pass() {
    let dir = TempDir::new().unwrap();
    let queue = UploadQueue::new(upload_config(&dir), RecordingBackend::default()).unwrap();

    let report = queue.run_pass().await;

    assert_eq!(report, Default::default());
    assert!(queue.pending_files().await.is_empty());
}
