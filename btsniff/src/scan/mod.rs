pub mod bluetoothctl;
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;
use btsniff_core::DeviceHit;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    Exit {
        command: String,
        status: std::process::ExitStatus,
    },

    #[error("radio unavailable: {0}")]
    Unavailable(String),
}

/// The Bluetooth radio collaborator.
///
/// A call runs one discovery window of `duration` and returns every device
/// seen in it.
#[async_trait]
pub trait Scanner: Send + Sync + 'static {
    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceHit>, ScanError>;
}

/// Decides when the next scan window is due.
///
/// Driven by the caller's polling cadence: each poll asks `is_due`, and a
/// window that starts calls `begin`.
#[derive(Debug, Clone)]
pub struct ScanScheduler {
    timer: Duration,
    scan_duration: Duration,
    last_scan: Option<Instant>,
}

impl ScanScheduler {
    pub fn new(timer: Duration, scan_duration: Duration) -> Self {
        Self {
            timer,
            scan_duration,
            last_scan: None,
        }
    }

    /// Time between window starts. When a window is longer than the timer,
    /// windows run back to back.
    pub fn effective_interval(&self) -> Duration {
        self.timer.max(self.scan_duration)
    }

    pub fn scan_duration(&self) -> Duration {
        self.scan_duration
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_scan {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.effective_interval(),
        }
    }

    pub fn begin(&mut self, now: Instant) {
        self.last_scan = Some(now);
    }

    /// Time until the next window is due.
    pub fn until_due(&self, now: Instant) -> Duration {
        match self.last_scan {
            None => Duration::ZERO,
            Some(last) => (last + self.effective_interval()).saturating_duration_since(now),
        }
    }
}
