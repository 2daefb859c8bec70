//! Append-only CSV log of emitted sample lines.
//!
//! The file is named after the time the run started and is flushed after
//! every line, so a sudden power loss costs at most the line being written.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use wheel_core::{OutputSink, SinkError};

pub struct CsvLogFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvLogFile {
    /// `wheels-2024-05-12T1403.csv` for a run started at 14:03.
    pub fn file_name(started: &DateTime<Local>) -> String {
        format!("wheels-{}.csv", started.format("%Y-%m-%dT%H%M"))
    }

    /// Opens (or appends to) the log for a run started at `started`,
    /// creating `dir` if needed.
    pub fn create(dir: &Path, started: &DateTime<Local>) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(started));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::with_capacity(8192, file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl OutputSink for CsvLogFile {
    fn write_header(&mut self, header: &str) -> Result<(), SinkError> {
        Ok(self.append(header)?)
    }

    fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        Ok(self.append(line)?)
    }
}
