//! Append-only CSV store

use crate::error::PersistenceError;
use crate::models::UsageRecord;
use chrono::SecondsFormat;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bumped whenever the column layout changes
pub const CSV_SCHEMA_VERSION: u32 = 1;

/// Column order of schema v1
pub const CSV_HEADER: [&str; 6] = ["timestamp", "namespace", "pod", "container", "cpu", "memory"];

/// One row per record, synced before `append` returns
pub struct CsvStore {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows_written: u64,
}

impl CsvStore {
    /// Open `path` for appending, writing the header if the file is new.
    ///
    /// An existing file must start with the v1 header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;

        let len = file
            .metadata()
            .map_err(|e| PersistenceError::io(&path, e))?
            .len();

        if len == 0 {
            let mut writer = Self::writer(file);
            writer.write_record(CSV_HEADER)?;
            writer.flush().map_err(|e| PersistenceError::io(&path, e))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| PersistenceError::io(&path, e))?;
            info!(path = %path.display(), version = CSV_SCHEMA_VERSION, "Created CSV store");
            return Ok(Self {
                path,
                writer,
                rows_written: 0,
            });
        }

        Self::check_header(&path, &mut file)?;
        Self::terminate_partial_row(&path, &mut file, len)?;
        info!(path = %path.display(), bytes = len, "Appending to existing CSV store");

        Ok(Self {
            path,
            writer: Self::writer(file),
            rows_written: 0,
        })
    }

    fn writer(file: File) -> csv::Writer<File> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file)
    }

    fn check_header(path: &Path, file: &mut File) -> Result<(), PersistenceError> {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| PersistenceError::io(path, e))?;

        let mut first_line = String::new();
        BufReader::new(&*file)
            .read_line(&mut first_line)
            .map_err(|e| PersistenceError::io(path, e))?;

        let found = first_line.trim_end_matches(&['\r', '\n'][..]);
        if found != CSV_HEADER.join(",") {
            return Err(PersistenceError::SchemaMismatch {
                path: path.to_path_buf(),
                version: CSV_SCHEMA_VERSION,
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// A crash mid-write can leave a row without its newline; start the next one cleanly
    fn terminate_partial_row(path: &Path, file: &mut File, len: u64) -> Result<(), PersistenceError> {
        file.seek(SeekFrom::Start(len - 1))
            .map_err(|e| PersistenceError::io(path, e))?;

        let mut last = [0u8; 1];
        file.read_exact(&mut last)
            .map_err(|e| PersistenceError::io(path, e))?;

        if last[0] != b'\n' {
            warn!(path = %path.display(), "CSV store ends with a partial row, terminating it");
            file.write_all(b"\n")
                .and_then(|_| file.sync_data())
                .map_err(|e| PersistenceError::io(path, e))?;
        }
        Ok(())
    }

    /// Append one row and sync it to disk
    pub fn append(&mut self, record: &UsageRecord) -> Result<(), PersistenceError> {
        let timestamp = record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let cpu = record.cpu_usage.to_string();
        let memory = record.memory_usage.to_string();

        self.writer.write_record([
            timestamp.as_str(),
            record.namespace.as_str(),
            record.pod_name.as_str(),
            record.container_name.as_str(),
            cpu.as_str(),
            memory.as_str(),
        ])?;
        self.sync()?;

        self.rows_written += 1;
        Ok(())
    }

    /// Flush buffered bytes and sync file data
    pub fn sync(&mut self) -> Result<(), PersistenceError> {
        self.writer
            .flush()
            .map_err(|e| PersistenceError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| PersistenceError::io(&self.path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}
