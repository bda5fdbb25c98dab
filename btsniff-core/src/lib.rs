use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;
pub use error::MacParseError;

// Names and vendor strings come straight from the radio and are never
// resized after capture, so they are kept as boxed slices.
type BoxStr = Box<str>;

/// Bluetooth device address (BD_ADDR).
///
/// Always rendered in canonical form: six uppercase hex octets separated by
/// colons, e.g. `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` and `aabbccddeeff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(MacParseError::Empty);
        }

        let groups: Vec<&str> = if raw.contains([':', '-']) {
            raw.split([':', '-']).collect()
        } else if raw.len() == 12 && raw.is_ascii() {
            (0..6).map(|i| &raw[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(MacParseError::Length(raw.len()));
        };

        if groups.len() != 6 {
            return Err(MacParseError::OctetCount(groups.len()));
        }

        let mut octets = [0u8; 6];
        for (slot, group) in octets.iter_mut().zip(groups) {
            if group.len() != 2 {
                return Err(MacParseError::InvalidOctet(group.into()));
            }
            *slot = u8::from_str_radix(group, 16)
                .map_err(|_| MacParseError::InvalidOctet(group.into()))?;
        }

        Ok(MacAddress(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.to_string()
    }
}

/// Radio technology a device was discovered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceKind {
    /// BR/EDR ("classic") Bluetooth.
    #[default]
    Classic,
    /// Bluetooth Low Energy.
    LowEnergy,
}

impl DeviceKind {
    /// Short tag written to the `Type` column of a capture file.
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceKind::Classic => "BT",
            DeviceKind::LowEnergy => "BLE",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A single device sighting produced by a scan window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHit {
    /// Address of the discovered device.
    pub address: MacAddress,
    /// Advertised name, if the device broadcast one.
    pub name: Option<BoxStr>,
    /// Received signal strength in dBm.
    pub rssi: Option<i16>,
    /// Manufacturer as reported by the radio stack.
    pub manufacturer: Option<BoxStr>,
    pub kind: DeviceKind,
    /// When the scan window observed the device.
    pub seen_at: jiff::Timestamp,
}

/// Snapshot of the latest position reported by the location daemon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters above mean sea level.
    pub altitude: Option<f64>,
    /// Horizontal error estimate in meters.
    pub accuracy: Option<f64>,
    /// Time of the fix as reported by the daemon.
    pub time: Option<jiff::Timestamp>,
}

/// One persisted capture row.
///
/// `location` is `None` when no fix was available at capture time; the row
/// is still written with the unknown-location sentinel so every row has
/// the same column count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub address: MacAddress,
    pub name: BoxStr,
    pub kind: DeviceKind,
    pub manufacturer: BoxStr,
    pub first_seen: jiff::Timestamp,
    pub rssi: Option<i16>,
    pub location: Option<LocationFix>,
}

impl DeviceRecord {
    /// Combine a sighting with the fix taken for its scan window.
    ///
    /// Pure mapping; filtering happens before a record is ever built.
    pub fn build(hit: DeviceHit, fix: Option<LocationFix>) -> Self {
        Self {
            address: hit.address,
            name: hit.name.unwrap_or_default(),
            kind: hit.kind,
            manufacturer: hit.manufacturer.unwrap_or_default(),
            first_seen: hit.seen_at,
            rssi: hit.rssi,
            location: fix,
        }
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }
}
