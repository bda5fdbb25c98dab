use std::path::PathBuf;
use std::time::Duration;

use btsniff::{
    BluetoothctlScanner, Config, GpsdClient, LocationSource, MockScanner, Placement,
    ScannerConfig, Scanner, Sniffer, SnifferState, UploadConfig, UploadConfigError, UploadQueue,
    WigleClient,
};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How often the host loop asks the sniffer whether a window is due.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "btsniff")]
#[command(about = "Bluetooth device logger with WiGLE upload")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "btsniff.toml")]
    config: PathBuf,

    /// Run a single scan window and upload pass, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "btsniff=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if !config.enabled {
        info!("btsniff is disabled in the configuration");
        return Ok(());
    }

    info!(
        timer = config.timer,
        scan_duration = config.scan_duration,
        file_size = config.file_size,
        gps = %format!("{}:{}", config.gps_host, config.gps_port),
        upload_dir = %config.path.display(),
        "Starting btsniff"
    );

    let state = SnifferState::new(Placement {
        x: config.bt_x_coord,
        y: config.bt_y_coord,
    });
    let location = GpsdClient::new(config.gps_host.clone(), config.gps_port, config.gps_timeout());

    match &config.scanner {
        ScannerConfig::Bluetoothctl { binary } => {
            info!(binary = %binary, "Using bluetoothctl scanner");
            let scanner = BluetoothctlScanner::new(binary.clone());
            run(config.clone(), scanner, location, state, cli.once).await?;
        }
        ScannerConfig::Mock { device_count } => {
            info!(device_count, "Using mock scanner");
            let scanner = MockScanner::new(*device_count);
            run(config.clone(), scanner, location, state, cli.once).await?;
        }
    }

    Ok(())
}

async fn run<S: Scanner, L: LocationSource>(
    config: Config,
    scanner: S,
    location: L,
    state: SnifferState,
    once: bool,
) -> color_eyre::Result<()> {
    let sniffer = Sniffer::try_start(&config, scanner, location, state.clone()).await;

    let uploader = match build_uploader(&config) {
        Ok(queue) => {
            info!(account = %config.wigle_name, "WiGLE uploads enabled");
            state.set_uploads_enabled(true).await;
            Some(queue)
        }
        Err(e) => {
            warn!(error = %e, "Uploads disabled");
            state.disable("upload", e.to_string()).await;
            None
        }
    };

    if once {
        if let Some(mut sniffer) = sniffer {
            sniffer.run_cycle().await;
            if let Err(e) = sniffer.shutdown() {
                error!(error = %e, "Failed to close active capture file");
            }
        }
        if let Some(queue) = uploader {
            let report = queue.run_pass().await;
            state
                .upload_pass(report.succeeded, report.failed, report.remaining)
                .await;
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();

    let scanner_handle = sniffer.map(|sniffer| {
        let cancel_for_scanner = cancel.clone();
        tokio::spawn(async move {
            run_scan_loop(sniffer, cancel_for_scanner).await;
        })
    });

    let uploader_handle = uploader.map(|queue| {
        let cancel_for_uploader = cancel.clone();
        let state_for_uploader = state.clone();
        let interval = config.upload_interval();
        tokio::spawn(async move {
            run_uploader(queue, interval, cancel_for_uploader, state_for_uploader).await;
        })
    });

    let listener = match &config.server {
        Some(server) => btsniff::server::bind(server.http_addr, &state).await,
        None => None,
    };

    match listener {
        Some(listener) => {
            let app = btsniff::server::router(state.clone());
            let cancel_for_http = cancel.clone();

            tokio::select! {
                result = axum::serve(listener, app).with_graceful_shutdown(async move {
                    cancel_for_http.cancelled().await;
                }) => {
                    if let Err(e) = result {
                        error!(error = ?e, "HTTP server error");
                    }
                    info!("HTTP server shut down");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Received Ctrl+C, shutting down...");
        }
    }
    cancel.cancel();

    // Wait for background tasks to complete
    for handle in [scanner_handle, uploader_handle].into_iter().flatten() {
        let _ = handle.await;
    }

    info!("btsniff shut down complete");
    Ok(())
}

fn build_uploader(config: &Config) -> Result<UploadQueue<WigleClient>, UploadConfigError> {
    let client = WigleClient::new(
        config.wigle_api_url.clone(),
        config.wigle_name.clone(),
        config.wigle_api_token.clone(),
    )?;

    UploadQueue::new(
        UploadConfig {
            path: config.path.clone(),
            uploaded_path: config.uploaded_path.clone(),
            remove_on_success: config.remove_on_success,
            check_connectivity: config.check_connectivity,
        },
        client,
    )
}

/// Host loop: polls the sniffer, which decides itself whether a window is due.
async fn run_scan_loop<S: Scanner, L: LocationSource>(
    mut sniffer: Sniffer<S, L>,
    cancel: CancellationToken,
) {
    info!("Scan loop started");

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Scan loop shutting down");
                break;
            }
            _ = poll.tick() => {
                sniffer.run_cycle().await;
            }
        }
    }

    if let Err(e) = sniffer.shutdown() {
        error!(error = %e, "Failed to close active capture file");
    }
}

async fn run_uploader(
    queue: UploadQueue<WigleClient>,
    upload_interval: Duration,
    cancel: CancellationToken,
    state: SnifferState,
) {
    info!(
        path = %queue.directory().display(),
        upload_interval_secs = upload_interval.as_secs(),
        "Uploader started"
    );

    let mut interval = tokio::time::interval(upload_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Uploader shutting down");
                break;
            }
            _ = interval.tick() => {
                let report = queue.run_pass().await;
                state
                    .upload_pass(report.succeeded, report.failed, report.remaining)
                    .await;
            }
        }
    }
}
