use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;

/// Display placement handed through to whatever renders the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub x: i32,
    pub y: i32,
}

/// Point-in-time view of the pipeline, suitable for a status display.
#[derive(Debug, Clone, Serialize)]
pub struct SnifferStatus {
    /// Short value for a one-line display: devices logged in the active file.
    pub display: String,
    pub placement: Placement,
    pub devices_tracked: usize,
    pub scans_completed: u64,
    pub last_scan_hits: usize,
    pub last_scan_at: Option<jiff::Timestamp>,
    pub last_fix: bool,
    pub records_written: u64,
    pub records_dropped: u64,
    pub rotations: u64,
    /// Filesystem failures since the last successful write.
    pub consecutive_write_failures: u32,
    pub last_error: Option<String>,
    /// Capabilities that failed to start; the rest of the process runs on.
    pub disabled_capabilities: Vec<String>,
    pub uploads_enabled: bool,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub pending_uploads: usize,
    pub uptime_secs: u64,
}

/// Shared state for tracking pipeline progress.
///
/// Written by the sniffer and the upload queue, read by status consumers.
pub struct SnifferState {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    placement: Placement,
    devices_tracked: usize,
    scans_completed: u64,
    last_scan_hits: usize,
    last_scan_at: Option<jiff::Timestamp>,
    last_fix: bool,
    records_written: u64,
    records_dropped: u64,
    rotations: u64,
    consecutive_write_failures: u32,
    last_error: Option<String>,
    disabled: Vec<String>,
    uploads_enabled: bool,
    uploads_succeeded: u64,
    uploads_failed: u64,
    pending_uploads: usize,
    startup_time: Instant,
}

impl SnifferState {
    pub fn new(placement: Placement) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                placement,
                devices_tracked: 0,
                scans_completed: 0,
                last_scan_hits: 0,
                last_scan_at: None,
                last_fix: false,
                records_written: 0,
                records_dropped: 0,
                rotations: 0,
                consecutive_write_failures: 0,
                last_error: None,
                disabled: Vec::new(),
                uploads_enabled: false,
                uploads_succeeded: 0,
                uploads_failed: 0,
                pending_uploads: 0,
                startup_time: Instant::now(),
            })),
        }
    }

    /// Record a finished scan window.
    pub async fn scan_completed(&self, hits: usize, had_fix: bool, devices_tracked: usize) {
        let mut inner = self.inner.lock().await;
        inner.scans_completed += 1;
        inner.last_scan_hits = hits;
        inner.last_scan_at = Some(jiff::Timestamp::now());
        inner.last_fix = had_fix;
        inner.devices_tracked = devices_tracked;
    }

    pub async fn record_written(&self) {
        let mut inner = self.inner.lock().await;
        inner.records_written += 1;
        inner.consecutive_write_failures = 0;
    }

    /// Record a filesystem failure. The counter keeps growing while the
    /// condition persists so operators can spot it.
    pub async fn write_failed(&self, dropped: bool, error: String) {
        let mut inner = self.inner.lock().await;
        if dropped {
            inner.records_dropped += 1;
        }
        inner.consecutive_write_failures += 1;
        inner.last_error = Some(error);
    }

    pub async fn rotated(&self) {
        let mut inner = self.inner.lock().await;
        inner.rotations += 1;
    }

    /// Record a capability that could not start.
    pub async fn disable(&self, capability: &str, error: String) {
        let mut inner = self.inner.lock().await;
        if !inner.disabled.iter().any(|c| c == capability) {
            inner.disabled.push(capability.to_string());
        }
        inner.last_error = Some(error);
    }

    pub async fn set_uploads_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock().await;
        inner.uploads_enabled = enabled;
    }

    /// Record the outcome of one upload queue pass.
    pub async fn upload_pass(&self, succeeded: usize, failed: usize, remaining: usize) {
        let mut inner = self.inner.lock().await;
        inner.uploads_succeeded += succeeded as u64;
        inner.uploads_failed += failed as u64;
        inner.pending_uploads = remaining;
    }

    pub async fn snapshot(&self) -> SnifferStatus {
        let inner = self.inner.lock().await;
        SnifferStatus {
            display: inner.devices_tracked.to_string(),
            placement: inner.placement,
            devices_tracked: inner.devices_tracked,
            scans_completed: inner.scans_completed,
            last_scan_hits: inner.last_scan_hits,
            last_scan_at: inner.last_scan_at,
            last_fix: inner.last_fix,
            records_written: inner.records_written,
            records_dropped: inner.records_dropped,
            rotations: inner.rotations,
            consecutive_write_failures: inner.consecutive_write_failures,
            last_error: inner.last_error.clone(),
            disabled_capabilities: inner.disabled.clone(),
            uploads_enabled: inner.uploads_enabled,
            uploads_succeeded: inner.uploads_succeeded,
            uploads_failed: inner.uploads_failed,
            pending_uploads: inner.pending_uploads,
            uptime_secs: inner.startup_time.elapsed().as_secs(),
        }
    }
}

impl Clone for SnifferState {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_failures_accumulate_until_success() {
        let state = SnifferState::new(Placement { x: 160, y: 66 });

        state.write_failed(true, "disk full".into()).await;
        state.write_failed(true, "disk full".into()).await;
        let status = state.snapshot().await;
        assert_eq!(status.consecutive_write_failures, 2);
        assert_eq!(status.records_dropped, 2);
        assert_eq!(status.last_error.as_deref(), Some("disk full"));

        state.record_written().await;
        let status = state.snapshot().await;
        assert_eq!(status.consecutive_write_failures, 0);
        assert_eq!(status.records_written, 1);
    }

    #[tokio::test]
    async fn disabled_capabilities_are_listed_once() {
        let state = SnifferState::new(Placement { x: 160, y: 66 });

        state.disable("upload", "missing credentials".into()).await;
        state.disable("upload", "missing credentials".into()).await;
        state.disable("status_server", "address in use".into()).await;

        let status = state.snapshot().await;
        assert_eq!(status.disabled_capabilities, vec!["upload", "status_server"]);
        assert_eq!(status.last_error.as_deref(), Some("address in use"));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let state = SnifferState::new(Placement { x: 1, y: 2 });
        let other = state.clone();

        other.scan_completed(3, true, 7).await;
        other.upload_pass(2, 1, 1).await;

        let status = state.snapshot().await;
        assert_eq!(status.display, "7");
        assert_eq!(status.last_scan_hits, 3);
        assert!(status.last_fix);
        assert_eq!(status.uploads_succeeded, 2);
        assert_eq!(status.uploads_failed, 1);
        assert_eq!(status.pending_uploads, 1);
        assert_eq!(status.placement, Placement { x: 1, y: 2 });
    }
}
