use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use btsniff_core::{DeviceRecord, MacAddress};
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::blacklist::Blacklist;
use crate::config::Config;
use crate::gps::LocationSource;
use crate::scan::{ScanScheduler, Scanner};
use crate::state::{SnifferState, SnifferStatus};
use crate::writer::{RollingFileWriter, WriterConfig, WriterError};

/// What one scan window produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices reported by the radio.
    pub hits: usize,
    pub blacklisted: usize,
    /// Devices already logged in the active file.
    pub duplicates: usize,
    pub written: usize,
    /// Records lost to filesystem errors.
    pub dropped: usize,
    pub had_fix: bool,
    /// Files finalized during this window.
    pub rotated: Vec<PathBuf>,
}

/// The capture pipeline: scan, filter, locate, persist.
///
/// Meant to be polled by a host loop; `run_cycle` does nothing until the
/// next window is due.
pub struct Sniffer<S, L> {
    scheduler: ScanScheduler,
    scanner: S,
    location: L,
    blacklist: Blacklist,
    writer: RollingFileWriter,
    /// Addresses in the active file; `None` when dedupe is off.
    seen: Option<HashSet<MacAddress>>,
    rows_in_active: usize,
    state: SnifferState,
}

impl<S: Scanner, L: LocationSource> Sniffer<S, L> {
    pub fn new(
        config: &Config,
        scanner: S,
        location: L,
        state: SnifferState,
    ) -> Result<Self, WriterError> {
        let writer = RollingFileWriter::open(WriterConfig {
            active_path: config.devices_file.clone(),
            upload_dir: config.path.clone(),
            file_size: config.file_size,
            preheader: config.wigle_preheader,
        })?;

        let existing = writer.existing_addresses();
        let rows_in_active = existing.len();
        let seen = config.dedupe.then(|| existing.into_iter().collect::<HashSet<_>>());
        let blacklist = Blacklist::new(&config.blacklist);

        info!(
            devices_file = %config.devices_file.display(),
            blacklisted = blacklist.len(),
            already_logged = rows_in_active,
            "Sniffer ready"
        );

        Ok(Self {
            scheduler: ScanScheduler::new(config.timer(), config.scan_duration()),
            scanner,
            location,
            blacklist,
            writer,
            seen,
            rows_in_active,
            state,
        })
    }

    /// Like [`Sniffer::new`], but a writer that cannot be set up disables
    /// capture instead of failing the caller.
    pub async fn try_start(
        config: &Config,
        scanner: S,
        location: L,
        state: SnifferState,
    ) -> Option<Self> {
        match Self::new(config, scanner, location, state.clone()) {
            Ok(sniffer) => Some(sniffer),
            Err(e) => {
                error!(error = %e, "Capture disabled");
                state.disable("capture", e.to_string()).await;
                None
            }
        }
    }

    /// Time until the next scan window is due.
    pub fn until_due(&self) -> Duration {
        self.scheduler.until_due(Instant::now())
    }

    /// Run a scan window if one is due. Returns `None` when it is not.
    pub async fn run_cycle(&mut self) -> Option<CycleReport> {
        let now = Instant::now();
        if !self.scheduler.is_due(now) {
            return None;
        }
        self.scheduler.begin(now);

        Some(self.scan_window().await)
    }

    pub async fn status(&self) -> SnifferStatus {
        self.state.snapshot().await
    }

    /// Flush and close the active file.
    pub fn shutdown(self) -> Result<(), WriterError> {
        self.writer.close()
    }

    #[instrument(name = "scan_window", skip(self))]
    async fn scan_window(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let hits = match self.scanner.scan(self.scheduler.scan_duration()).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Scan failed, treating window as empty");
                Vec::new()
            }
        };
        report.hits = hits.len();

        let fix = self.location.current_fix().await;
        report.had_fix = fix.is_some();
        if fix.is_none() && !hits.is_empty() {
            warn!("No GPS fix, logging devices without location");
        }

        for hit in hits {
            let address = hit.address;
            if !self.blacklist.keep_address(&address) {
                report.blacklisted += 1;
                continue;
            }
            if let Some(seen) = &self.seen
                && seen.contains(&address)
            {
                report.duplicates += 1;
                continue;
            }

            let record = DeviceRecord::build(hit, fix);
            match self.writer.append(&record) {
                Ok(rotated) => {
                    report.written += 1;
                    self.logged(address);
                    self.state.record_written().await;
                    if let Some(path) = rotated {
                        self.start_new_file();
                        self.state.rotated().await;
                        report.rotated.push(path);
                    }
                }
                Err(e @ WriterError::Rotate { .. }) => {
                    // Row is on disk; the rotation is retried on the next append.
                    report.written += 1;
                    self.logged(address);
                    self.state.record_written().await;
                    error!(error = %e, "Rotation failed");
                    self.state.write_failed(false, e.to_string()).await;
                }
                Err(e) => {
                    report.dropped += 1;
                    error!(%address, error = %e, "Dropping record");
                    self.state.write_failed(true, e.to_string()).await;
                }
            }
        }

        self.state
            .scan_completed(report.hits, report.had_fix, self.rows_in_active)
            .await;

        info!(
            hits = report.hits,
            written = report.written,
            blacklisted = report.blacklisted,
            duplicates = report.duplicates,
            dropped = report.dropped,
            had_fix = report.had_fix,
            "Scan window complete"
        );
        report
    }

    fn logged(&mut self, address: MacAddress) {
        self.rows_in_active += 1;
        if let Some(seen) = &mut self.seen {
            seen.insert(address);
        }
    }

    fn start_new_file(&mut self) {
        self.rows_in_active = 0;
        if let Some(seen) = &mut self.seen {
            seen.clear();
        }
    }
}
