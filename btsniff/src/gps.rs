use std::time::Duration;

use async_trait::async_trait;
use btsniff_core::LocationFix;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true}\n";

/// Best-effort source of the current position.
///
/// Implementations never fail: every problem collapses into `None` so a
/// missing GPS never stalls scanning.
#[async_trait]
pub trait LocationSource: Send + Sync + 'static {
    async fn current_fix(&self) -> Option<LocationFix>;
}

/// Source used when no location daemon is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationSource for NoLocation {
    async fn current_fix(&self) -> Option<LocationFix> {
        None
    }
}

#[derive(Debug, thiserror::Error)]
enum GpsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gpsd closed the connection before reporting a fix")]
    Closed,
}

/// Client for a gpsd instance speaking its JSON protocol over TCP.
#[derive(Debug, Clone)]
pub struct GpsdClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl GpsdClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn query(&self) -> Result<LocationFix, GpsError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(WATCH_COMMAND).await?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(fix) = parse_report(&line) {
                return Ok(fix);
            }
        }

        Err(GpsError::Closed)
    }
}

#[async_trait]
impl LocationSource for GpsdClient {
    #[instrument(name = "gps_query", skip(self), fields(host = %self.host, port = self.port))]
    async fn current_fix(&self) -> Option<LocationFix> {
        match tokio::time::timeout(self.timeout, self.query()).await {
            Ok(Ok(fix)) => {
                debug!(lat = fix.latitude, lon = fix.longitude, "Got GPS fix");
                Some(fix)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "GPS query failed");
                None
            }
            Err(_) => {
                debug!(timeout_ms = self.timeout.as_millis() as u64, "GPS query timed out");
                None
            }
        }
    }
}

/// Subset of a gpsd report we care about.
#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(rename = "altMSL")]
    alt_msl: Option<f64>,
    alt: Option<f64>,
    epx: Option<f64>,
    eps: Option<f64>,
    time: Option<String>,
}

/// Extract a fix from one line of gpsd output.
///
/// Only `TPV` reports in 2D or 3D mode carrying both coordinates count;
/// everything else (VERSION, DEVICES, SKY, mode 0/1, garbage) is skipped.
fn parse_report(line: &str) -> Option<LocationFix> {
    let report: Report = serde_json::from_str(line.trim()).ok()?;
    if report.class != "TPV" || report.mode < 2 {
        return None;
    }

    Some(LocationFix {
        latitude: report.lat?,
        longitude: report.lon?,
        altitude: report.alt_msl.or(report.alt),
        accuracy: report.epx.or(report.eps),
        time: report.time.and_then(|t| t.parse().ok()),
    })
}
