pub mod blacklist;
pub mod config;
pub mod gps;
pub mod record;
pub mod scan;
pub mod server;
pub mod sniffer;
pub mod state;
pub mod upload;
pub mod writer;

pub use blacklist::Blacklist;
pub use config::{Config, ConfigError, ScannerConfig, ServerConfig};
pub use gps::{GpsdClient, LocationSource, NoLocation};
pub use scan::bluetoothctl::BluetoothctlScanner;
pub use scan::mock::MockScanner;
pub use scan::{ScanError, ScanScheduler, Scanner};
pub use sniffer::{CycleReport, Sniffer};
pub use state::{Placement, SnifferState, SnifferStatus};
pub use upload::wigle::{WigleClient, WigleError};
pub use upload::{
    PassReport, UploadBackend, UploadConfig, UploadConfigError, UploadQueue, UploadState,
};
pub use writer::{RollingFileWriter, WriterConfig, WriterError};
