use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use btsniff_core::{DeviceRecord, MacAddress};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::record::{WIGLE_COLUMNS, WIGLE_PREHEADER, wigle_row};

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// The record was not persisted.
    #[error("failed to write to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The record was persisted but the full file could not be finalized;
    /// rotation is retried on the next append.
    #[error("failed to finalize {path}: {source}")]
    Rotate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] csv::Error),
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Path of the single active file.
    pub active_path: PathBuf,
    /// Directory finalized files are moved into.
    pub upload_dir: PathBuf,
    /// Rotation threshold in bytes.
    pub file_size: u64,
    /// Emit the WiGLE pre-header line at file creation.
    pub preheader: bool,
}

struct ActiveFile {
    file: File,
    size: u64,
}

/// Append-only CSV writer with size-based rotation.
///
/// Exactly one active file exists at a time. Once a file leaves the active
/// slot it is never written again.
pub struct RollingFileWriter {
    config: WriterConfig,
    active: Option<ActiveFile>,
}

impl RollingFileWriter {
    /// Prepare directories. The active file is opened lazily on first append;
    /// an existing one from a previous run is appended to.
    pub fn open(config: WriterConfig) -> Result<Self, WriterError> {
        if let Some(parent) = config.active_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| WriterError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::create_dir_all(&config.upload_dir).map_err(|source| WriterError::Write {
            path: config.upload_dir.clone(),
            source,
        })?;

        Ok(Self {
            config,
            active: None,
        })
    }

    pub fn active_path(&self) -> &Path {
        &self.config.active_path
    }

    /// Bytes in the active file, as tracked by the writer.
    pub fn active_size(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.size)
    }

    /// Append one row. Returns the finalized path when this append caused a
    /// rotation.
    pub fn append(&mut self, record: &DeviceRecord) -> Result<Option<PathBuf>, WriterError> {
        let row = encode(wigle_row(record))?;
        let limit = self.config.file_size;

        let mut active = match self.active.take() {
            Some(active) => active,
            None => open_active(&self.config.active_path, self.config.preheader)?,
        };

        // On a short write the size is unknown; the handle is dropped so the
        // next append reopens the file, measures it and terminates a torn row.
        if let Err(source) = active.file.write_all(&row).and_then(|_| active.file.flush()) {
            return Err(WriterError::Write {
                path: self.config.active_path.clone(),
                source,
            });
        }

        active.size += row.len() as u64;
        let size = active.size;
        self.active = Some(active);

        if size > limit {
            debug!(size, limit, "Active file over threshold");
            return self.rotate().map(Some);
        }

        Ok(None)
    }

    /// Finalize the active file into the upload directory and start a new one.
    pub fn rotate(&mut self) -> Result<PathBuf, WriterError> {
        let source = self.config.active_path.clone();
        let rotate_err = |e| WriterError::Rotate {
            path: source.clone(),
            source: e,
        };

        if let Some(active) = self.active.take() {
            active.file.sync_all().map_err(rotate_err)?;
        }

        let dest = self.finalized_path();
        move_file(&source, &dest).map_err(rotate_err)?;
        info!(from = %source.display(), to = %dest.display(), "Rolled over capture file");

        match open_active(&source, self.config.preheader) {
            Ok(active) => self.active = Some(active),
            Err(e) => warn!(error = %e, "Could not open new active file, will retry on next record"),
        }

        Ok(dest)
    }

    /// Addresses already logged in the active file.
    pub fn existing_addresses(&self) -> Vec<MacAddress> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.config.active_path);

        let Ok(mut reader) = reader else {
            return Vec::new();
        };

        reader
            .records()
            .filter_map(Result::ok)
            .filter_map(|row| row.get(0).and_then(|mac| mac.parse().ok()))
            .collect()
    }

    /// Flush the active file to disk. Called once on shutdown.
    pub fn close(mut self) -> Result<(), WriterError> {
        if let Some(active) = self.active.take() {
            active.file.sync_all().map_err(|source| WriterError::Write {
                path: self.config.active_path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn finalized_path(&self) -> PathBuf {
        let stem = self
            .config
            .active_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bluetooth_devices".to_string());
        let stamp = jiff::Timestamp::now().strftime("%Y%m%d_%H%M%S");

        self.config
            .upload_dir
            .join(format!("{stem}_{stamp}_{}.csv", Ulid::new()))
    }
}

fn open_active(path: &Path, preheader: bool) -> Result<ActiveFile, WriterError> {
    let write_err = |source| WriterError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(write_err)?;
    let mut size = file.metadata().map_err(write_err)?.len();

    if size > 0 && !ends_with_newline(&mut file, size).map_err(write_err)? {
        // A crash or short write left a partial row; keep it on its own line.
        file.write_all(b"\n")
            .and_then(|_| file.flush())
            .map_err(write_err)?;
        size += 1;
        warn!(path = %path.display(), "Terminated torn row in capture file");
    }

    if size == 0 {
        let mut header = Vec::new();
        if preheader {
            header.extend_from_slice(WIGLE_PREHEADER.as_bytes());
            header.push(b'\n');
        }
        header.extend(encode(WIGLE_COLUMNS)?);

        file.write_all(&header)
            .and_then(|_| file.flush())
            .map_err(write_err)?;
        size = header.len() as u64;
        debug!(path = %path.display(), "Created capture file");
    }

    Ok(ActiveFile { file, size })
}

fn ends_with_newline(file: &mut File, size: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(size - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn encode<I, T>(fields: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Rename, or copy-then-rename when the upload directory lives on another
/// filesystem. The uploader only picks up `*.csv`, never the `.partial`.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let partial = to.with_extension("csv.partial");
            fs::copy(from, &partial)?;
            File::open(&partial)?.sync_all()?;
            fs::rename(&partial, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}
