use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use btsniff_core::{DeviceHit, DeviceKind, MacAddress};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{ScanError, Scanner};

/// Scanner backed by BlueZ's `bluetoothctl`.
pub struct BluetoothctlScanner {
    binary: String,
}

impl BluetoothctlScanner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn output(&self, args: &[&str]) -> Result<String, ScanError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|source| ScanError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScanError::Exit {
                command,
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Scanner for BluetoothctlScanner {
    #[instrument(name = "bluetoothctl_scan", skip(self), fields(duration_secs = duration.as_secs()))]
    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceHit>, ScanError> {
        info!("Starting bluetoothctl discovery");

        let timeout = duration.as_secs().max(1).to_string();
        let mut discovery = Command::new(&self.binary)
            .args(["--timeout", &timeout, "scan", "on"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScanError::Spawn {
                command: format!("{} scan on", self.binary),
                source,
            })?;

        tokio::time::sleep(duration).await;

        // Already exited when --timeout fired first.
        let _ = discovery.kill().await;
        if let Err(e) = self.output(&["scan", "off"]).await {
            debug!(error = %e, "Stopping discovery failed");
        }

        let listing = self.output(&["devices"]).await?;
        let seen_at = jiff::Timestamp::now();

        let mut hits = Vec::new();
        for (address, name) in parse_devices(&listing) {
            let info = match self.output(&["info", &address.to_string()]).await {
                Ok(out) => parse_info(&out),
                Err(e) => {
                    debug!(%address, error = %e, "Device info unavailable");
                    DeviceInfo::default()
                }
            };

            hits.push(DeviceHit {
                address,
                name,
                rssi: info.rssi,
                manufacturer: info.manufacturer,
                kind: info.kind,
                seen_at,
            });
        }

        info!(devices = hits.len(), "Discovery finished");
        Ok(hits)
    }
}

/// Details pulled from `bluetoothctl info <addr>`.
#[derive(Debug, Default, PartialEq)]
struct DeviceInfo {
    rssi: Option<i16>,
    manufacturer: Option<Box<str>>,
    kind: DeviceKind,
}

/// Parse `bluetoothctl devices` output into addresses and names.
///
/// BlueZ names unnamed devices after their address; those get no name.
fn parse_devices(output: &str) -> Vec<(MacAddress, Option<Box<str>>)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = &line[line.find("Device ")? + "Device ".len()..];
            let (addr, name) = match rest.split_once(' ') {
                Some((addr, name)) => (addr, name.trim()),
                None => (rest.trim(), ""),
            };
            let address: MacAddress = addr.parse().ok()?;

            let name = (!name.is_empty() && name.parse::<MacAddress>().is_err())
                .then(|| name.into());
            Some((address, name))
        })
        .collect()
}

fn parse_info(output: &str) -> DeviceInfo {
    let mut info = DeviceInfo::default();

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();

        if key == "RSSI" {
            // Newer BlueZ prints `0xffffffc4 (-60)`.
            let raw = match (value.find('('), value.find(')')) {
                (Some(open), Some(close)) if open < close => &value[open + 1..close],
                _ => value,
            };
            info.rssi = raw.trim().parse().ok();
        } else if key.starts_with("Manufacturer") && info.manufacturer.is_none() {
            info.manufacturer = Some(value.into());
        } else if key.ends_with("Type") && (value.contains("LE") || value == "random") {
            info.kind = DeviceKind::LowEnergy;
        }
    }

    info
}
