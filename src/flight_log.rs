//! # Flight Log Persistence
//!
//! Appends every accepted telemetry record to `Flight_<TEAM_ID>.csv` in the
//! configured data directory. The file survives process restarts: the header
//! row is written only when the file is new or empty, and rows are appended
//! after any existing content. A failed write drops the file handle so the
//! next append reopens from scratch.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{GroundStationError, Result};
use crate::frame::encoder::encode_csv_row;
use crate::frame::schema::{TelemetryRecord, CSV_HEADER};

/// Append-only CSV writer for the mission flight log
#[derive(Debug)]
pub struct FlightLog {
    path: PathBuf,
    file: Option<File>,
}

impl FlightLog {
    /// Create a writer for the given team without touching the filesystem
    ///
    /// The file itself is created lazily on the first append, so a
    /// misconfigured data directory degrades persistence instead of
    /// blocking startup.
    pub fn new(data_dir: &Path, team_id: u16) -> Self {
        Self {
            path: data_dir.join(format!("Flight_{:04}.csv", team_id)),
            file: None,
        }
    }

    /// Path of the CSV file this writer appends to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log file, creating directories and the header as needed
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::PersistenceUnavailable`] if the data
    /// directory or file cannot be opened
    pub fn ensure_open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(GroundStationError::PersistenceUnavailable)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(GroundStationError::PersistenceUnavailable)?;

        let length = file
            .metadata()
            .map_err(GroundStationError::PersistenceUnavailable)?
            .len();

        if length == 0 {
            file.write_all(CSV_HEADER.as_bytes())
                .and_then(|_| file.write_all(b"\r\n"))
                .map_err(GroundStationError::PersistenceUnavailable)?;
            info!("Created flight log: {}", self.path.display());
        } else {
            debug!(
                "Appending to existing flight log: {}",
                self.path.display()
            );
        }

        self.file = Some(file);
        Ok(())
    }

    /// Append one record as a CSV row terminated by CRLF
    ///
    /// On any I/O failure the handle is dropped so a later append can
    /// reopen the file once the underlying problem clears.
    ///
    /// # Errors
    ///
    /// Returns [`GroundStationError::PersistenceUnavailable`] if the row
    /// cannot be written
    pub fn append(&mut self, record: &TelemetryRecord) -> Result<()> {
        self.ensure_open()?;

        let row = encode_csv_row(record);
        let result = match &mut self.file {
            Some(file) => file
                .write_all(row.as_bytes())
                .and_then(|_| file.write_all(b"\r\n"))
                .and_then(|_| file.flush()),
            None => return Ok(()),
        };

        if let Err(error) = result {
            self.file = None;
            return Err(GroundStationError::PersistenceUnavailable(error));
        }
        Ok(())
    }
}
