use std::time::Duration;

use async_trait::async_trait;
use btsniff_core::{DeviceHit, DeviceKind, MacAddress};
use rand::Rng;
use tracing::info;

use super::{ScanError, Scanner};

const NAMES: [&str; 6] = ["Phone", "Watch", "Earbuds", "Speaker", "Tracker", "Laptop"];

/// Information about a simulated device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub address: MacAddress,
    pub name: Option<Box<str>>,
    pub kind: DeviceKind,
}

/// Scanner that produces fake sightings from a fixed set of devices.
pub struct MockScanner {
    devices: Vec<MockDevice>,
    /// Chance that a device shows up in a given window.
    visibility: f64,
}

impl MockScanner {
    pub fn new(device_count: usize) -> Self {
        let mut rng = rand::rng();
        let devices = (0..device_count)
            .map(|i| {
                let mut octets: [u8; 6] = rng.random();
                // Locally administered, unicast.
                octets[0] = (octets[0] | 0x02) & 0xFE;
                MockDevice {
                    address: MacAddress(octets),
                    name: rng
                        .random_bool(0.6)
                        .then(|| format!("{} {}", NAMES[i % NAMES.len()], i).into()),
                    kind: if rng.random_bool(0.5) {
                        DeviceKind::LowEnergy
                    } else {
                        DeviceKind::Classic
                    },
                }
            })
            .collect();

        Self {
            devices,
            visibility: 0.7,
        }
    }

    /// Return the simulated devices.
    pub fn devices(&self) -> &[MockDevice] {
        &self.devices
    }
}

#[async_trait]
impl Scanner for MockScanner {
    async fn scan(&self, duration: Duration) -> Result<Vec<DeviceHit>, ScanError> {
        tokio::time::sleep(duration).await;

        let seen_at = jiff::Timestamp::now();
        let mut rng = rand::rng();
        let hits: Vec<DeviceHit> = self
            .devices
            .iter()
            .filter_map(|device| {
                rng.random_bool(self.visibility).then(|| DeviceHit {
                    address: device.address,
                    name: device.name.clone(),
                    rssi: Some(rng.random_range(-95..-40)),
                    manufacturer: None,
                    kind: device.kind,
                    seen_at,
                })
            })
            .collect();

        info!(devices = hits.len(), "Mock discovery finished");
        Ok(hits)
    }
}
