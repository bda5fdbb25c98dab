//! WiGLE CSV rendering of capture records.

use btsniff_core::DeviceRecord;

/// First line of a WiGLE 1.6 upload file.
pub const WIGLE_PREHEADER: &str = "WigleWifi-1.6,appRelease=1.0,model=RaspberryPi,release=btsniff,\
device=RaspberryPi,display=display,board=board,brand=RaspberryPi,star=Sol,body=3,subBody=0";

/// Column header, identical for every file the writer produces.
pub const WIGLE_COLUMNS: [&str; 14] = [
    "MAC",
    "SSID",
    "AuthMode",
    "FirstSeen",
    "Channel",
    "Frequency",
    "RSSI",
    "CurrentLatitude",
    "CurrentLongitude",
    "AltitudeMeters",
    "AccuracyMeters",
    "RCOIs",
    "MfgrId",
    "Type",
];

const FIRST_SEEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a record as the 14 WiGLE columns.
///
/// Without a fix every location column carries zero, which WiGLE treats
/// as "no position".
pub fn wigle_row(record: &DeviceRecord) -> [String; 14] {
    let (lat, lon, alt, acc) = match record.location {
        Some(fix) => (
            fix.latitude,
            fix.longitude,
            fix.altitude.unwrap_or(0.0),
            fix.accuracy.unwrap_or(0.0),
        ),
        None => (0.0, 0.0, 0.0, 0.0),
    };

    [
        record.address.to_string(),
        record.name.to_string(),
        format!("Misc [{}]", record.kind.tag()),
        record.first_seen.strftime(FIRST_SEEN_FORMAT).to_string(),
        "0".to_string(),
        "0".to_string(),
        record.rssi.unwrap_or(0).to_string(),
        format!("{lat:.9}"),
        format!("{lon:.9}"),
        format!("{alt:.1}"),
        format!("{acc:.6}"),
        String::new(),
        record.manufacturer.to_string(),
        record.kind.tag().to_string(),
    ]
}
