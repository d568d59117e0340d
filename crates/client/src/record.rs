//! Per-port connection records
//!
//! After a successful attach, the remote endpoint and bus id are stored in
//! `<state_dir>/port<N>` as a single line:
//!
//! ```text
//! <host> <service> <busid>\n
//! ```
//!
//! The file is rewritten wholesale on every attach. `reattach` reads it
//! back to re-establish the session after the connection dropped.

use crate::error::{Error, Result};
use std::fmt;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Remote endpoint and device of one attached port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub host: String,
    pub service: String,
    pub busid: String,
}

impl AttachmentRecord {
    pub fn new(host: &str, service: &str, busid: &str) -> Self {
        Self {
            host: host.to_string(),
            service: service.to_string(),
            busid: busid.to_string(),
        }
    }

    /// Parse the first line of a record file
    ///
    /// Exactly three whitespace-separated fields are required.
    pub fn parse(content: &str) -> Option<Self> {
        let line = content.lines().next()?;
        let mut fields = line.split_whitespace();
        let record = Self {
            host: fields.next()?.to_string(),
            service: fields.next()?.to_string(),
            busid: fields.next()?.to_string(),
        };
        match fields.next() {
            Some(_) => None,
            None => Some(record),
        }
    }
}

impl fmt::Display for AttachmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} {}", self.host, self.service, self.busid)
    }
}

/// Reads and writes connection records under one state directory
#[derive(Debug, Clone)]
pub struct ConnectionRecorder {
    state_dir: PathBuf,
}

impl ConnectionRecorder {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Record file for `port`
    pub fn record_path(&self, port: u16) -> PathBuf {
        self.state_dir.join(format!("port{}", port))
    }

    /// Persist the session attached to `port`, replacing any previous record
    pub fn record_connection(&self, host: &str, service: &str, busid: &str, port: u16) -> Result<()> {
        self.ensure_state_dir()?;

        let path = self.record_path(port);
        let line = AttachmentRecord::new(host, service, busid).to_string();
        let record_error = |source: io::Error| Error::Record {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o700)
            .open(&path)
            .map_err(record_error)?;

        let written = file.write(line.as_bytes()).map_err(record_error)?;
        if written != line.len() {
            return Err(record_error(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, line.len()),
            )));
        }

        debug!("Recorded port {} -> {}", port, line.trim_end());
        Ok(())
    }

    /// Load the record previously written for `port`
    pub fn read_record(&self, port: u16) -> Result<AttachmentRecord> {
        let path = self.record_path(port);
        let content = fs::read_to_string(&path).map_err(|e| Error::RecordNotFound {
            port,
            reason: format!("{}: {}", path.display(), e),
        })?;

        AttachmentRecord::parse(&content).ok_or_else(|| Error::RecordNotFound {
            port,
            reason: format!("{}: malformed record", path.display()),
        })
    }

    /// Create the state directory, or check that what occupies its path is one
    fn ensure_state_dir(&self) -> Result<()> {
        let record_error = |source: io::Error| Error::Record {
            path: self.state_dir.clone(),
            source,
        };

        match DirBuilder::new().mode(0o700).create(&self.state_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let metadata = fs::metadata(&self.state_dir).map_err(record_error)?;
                if metadata.is_dir() {
                    Ok(())
                } else {
                    Err(record_error(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "path exists and is not a directory",
                    )))
                }
            }
            Err(e) => Err(record_error(e)),
        }
    }
}
