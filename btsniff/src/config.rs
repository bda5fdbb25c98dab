use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Runtime configuration, read once at startup and never mutated.
///
/// Option names follow the plugin configuration the capture files were
/// originally produced with, so existing config snippets keep working.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for scanning and uploading.
    pub enabled: bool,
    /// Seconds between the start of two scan windows.
    pub timer: u64,
    /// Seconds a single scan window lasts.
    pub scan_duration: u64,
    /// Active file size in bytes above which it is rotated.
    pub file_size: u64,
    /// Path of the active capture file.
    pub devices_file: PathBuf,
    /// Display placement, passed through to status consumers.
    pub bt_x_coord: i32,
    pub bt_y_coord: i32,
    pub gps_host: String,
    pub gps_port: u16,
    /// Upper bound for one GPS query.
    pub gps_timeout_ms: u64,
    /// Device addresses that are never logged.
    pub blacklist: Vec<String>,
    /// Directory holding finalized files awaiting upload.
    pub path: PathBuf,
    /// Where uploaded files are moved when they are not removed.
    pub uploaded_path: Option<PathBuf>,
    pub wigle_name: String,
    pub wigle_api_token: String,
    pub wigle_api_url: String,
    pub remove_on_success: bool,
    /// Seconds between upload queue passes.
    pub upload_check_interval: u64,
    /// Probe the upload API before each pass and skip the pass when it is unreachable.
    pub check_connectivity: bool,
    /// Write the `WigleWifi-1.6` pre-header line above the column header.
    pub wigle_preheader: bool,
    /// Log each device once per active file.
    pub dedupe: bool,
    pub scanner: ScannerConfig,
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScannerConfig {
    Bluetoothctl {
        /// Name or path of the bluetoothctl binary.
        #[serde(default = "default_bluetoothctl")]
        binary: String,
    },
    Mock {
        /// Number of simulated devices in range.
        device_count: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for the status HTTP server to listen on
    pub http_addr: SocketAddr,
}

fn default_bluetoothctl() -> String {
    "bluetoothctl".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timer == 0 {
            return Err(ConfigError::Zero("timer"));
        }
        if self.scan_duration == 0 {
            return Err(ConfigError::Zero("scan_duration"));
        }
        if self.file_size == 0 {
            return Err(ConfigError::Zero("file_size"));
        }
        if self.upload_check_interval == 0 {
            return Err(ConfigError::Zero("upload_check_interval"));
        }
        Ok(())
    }

    pub fn timer(&self) -> Duration {
        Duration::from_secs(self.timer)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration)
    }

    pub fn gps_timeout(&self) -> Duration {
        Duration::from_millis(self.gps_timeout_ms)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_secs(self.upload_check_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            timer: 45,
            scan_duration: 10,
            file_size: 15_000,
            devices_file: PathBuf::from("/root/handshakes/bluetooth_devices.csv"),
            bt_x_coord: 160,
            bt_y_coord: 66,
            gps_host: "127.0.0.1".to_string(),
            gps_port: 2947,
            gps_timeout_ms: 2_500,
            blacklist: Vec::new(),
            path: PathBuf::from("/root/handshakes/toupload/"),
            uploaded_path: None,
            wigle_name: String::new(),
            wigle_api_token: String::new(),
            wigle_api_url: "https://api.wigle.net".to_string(),
            remove_on_success: true,
            upload_check_interval: 300,
            check_connectivity: false,
            wigle_preheader: true,
            dedupe: true,
            scanner: ScannerConfig::Bluetoothctl {
                binary: default_bluetoothctl(),
            },
            server: None,
        }
    }
}
