//! Archive sink
//!
//! Writes one ZIP entry per document at `{database}/{table}/{id}.json`.
//! The sink is synchronous and owned by a single writer; the export
//! pipeline drives it from a blocking task.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ArchiveError, Result};

/// Payloads at or above this size need ZIP64 local headers
const LARGE_ENTRY_THRESHOLD: usize = u32::MAX as usize;

/// How entries are written
#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions {
    /// Replace an existing file at the destination
    pub overwrite: bool,
    /// Deflate level 1-9; 0 stores entries uncompressed
    pub compression_level: i32,
    /// Make closing the container fail once the central directory is written
    #[cfg(test)]
    pub(crate) fail_finalize: bool,
}

impl ArchiveOptions {
    pub fn new(overwrite: bool, compression_level: i32) -> Self {
        Self {
            overwrite,
            compression_level,
            #[cfg(test)]
            fail_finalize: false,
        }
    }
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self::new(false, 6)
    }
}

/// Summary of a finalized archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStats {
    pub path: PathBuf,
    /// Entries written
    pub entries: u64,
    /// Uncompressed payload bytes
    pub payload_bytes: u64,
    /// Size of the archive on disk
    pub file_size: u64,
}

/// Escape one path component of an entry name
///
/// `/` and `\` would introduce extra directory levels; `%` is escaped so
/// the mapping stays reversible.
pub fn escape_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Entry name for a document: `{database}/{table}/{id}.json`
pub fn entry_path(database: &str, table: &str, id: &str) -> String {
    format!(
        "{}/{}/{}.json",
        escape_component(database),
        escape_component(table),
        escape_component(id)
    )
}

/// Single-writer ZIP archive
///
/// Entries are appended in call order. The archive is only valid once
/// [`finalize`](Self::finalize) has written the central directory. An
/// archive dropped before that is removed.
pub struct ArchiveSink {
    path: PathBuf,
    writer: Option<ZipWriter<BufWriter<File>>>,
    options: ArchiveOptions,
    entries: u64,
    payload_bytes: u64,
}

impl ArchiveSink {
    /// Create the archive file at `path`
    ///
    /// Fails with [`ArchiveError::DestinationExists`] if the file exists and
    /// `overwrite` is not set. The check and the creation are one call.
    pub fn create(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut open = OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }

        let file = open.open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => ArchiveError::DestinationExists(path.clone()),
            _ => ArchiveError::CreateFailed {
                path: path.clone(),
                reason: e.to_string(),
            },
        })?;

        debug!("Created archive {}", path.display());

        Ok(Self {
            path,
            writer: Some(ZipWriter::new(BufWriter::new(file))),
            options,
            entries: 0,
            payload_bytes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Append one entry
    pub fn append(&mut self, entry: &str, payload: &[u8]) -> Result<()> {
        let level = self.options.compression_level;
        let writer = self
            .writer
            .as_mut()
            .ok_or(ArchiveError::AlreadyFinalized)?;

        let options = match level {
            0 => SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
            _ => SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(level.into())),
        }
        .large_file(payload.len() >= LARGE_ENTRY_THRESHOLD);

        let write_failed = |reason: String| ArchiveError::WriteFailed {
            entry: entry.to_string(),
            reason,
        };

        writer
            .start_file(entry, options)
            .map_err(|e| write_failed(e.to_string()))?;
        writer
            .write_all(payload)
            .map_err(|e| write_failed(e.to_string()))?;

        self.entries += 1;
        self.payload_bytes += payload.len() as u64;
        Ok(())
    }

    /// Write the central directory and flush the file to disk
    ///
    /// On failure the file is removed: an archive that could not be
    /// completed is never left at the destination.
    pub fn finalize(mut self) -> Result<ArchiveStats> {
        let writer = self.writer.take().ok_or(ArchiveError::AlreadyFinalized)?;

        let file_size = match self.close(writer) {
            Ok(size) => size,
            Err(e) => {
                error!("Failed to finalize archive {}: {}", self.path.display(), e);
                self.remove_file();
                return Err(e);
            }
        };

        info!(
            "Finalized archive {} ({} entries, {} bytes)",
            self.path.display(),
            self.entries,
            file_size
        );

        Ok(ArchiveStats {
            path: self.path.clone(),
            entries: self.entries,
            payload_bytes: self.payload_bytes,
            file_size,
        })
    }

    /// Close the archive after a failure
    ///
    /// The container is finished so the file stays a readable ZIP holding
    /// the entries written so far. It is then removed unless `keep_partial`
    /// is set. A container that cannot be finished is always removed.
    pub fn abandon(mut self, keep_partial: bool) -> Result<()> {
        let writer = self.writer.take().ok_or(ArchiveError::AlreadyFinalized)?;

        match self.close(writer) {
            Ok(_) if keep_partial => {
                warn!(
                    "Kept incomplete archive {} ({} entries)",
                    self.path.display(),
                    self.entries
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if keep_partial => {
                error!(
                    "Incomplete archive {} could not be closed, removing it: {}",
                    self.path.display(),
                    e
                );
                self.remove_file();
                return Err(e);
            }
            Err(e) => debug!("Partial archive could not be closed cleanly: {}", e),
        }

        self.remove_file();
        Ok(())
    }

    /// Finish the container, sync it and return its size on disk
    fn close(&self, writer: ZipWriter<BufWriter<File>>) -> Result<u64> {
        let file = finish(writer)?;

        #[cfg(test)]
        if self.options.fail_finalize {
            return Err(ArchiveError::FinalizeFailed("No space left on device".to_string()).into());
        }

        file.sync_all()
            .map_err(|e| ArchiveError::FinalizeFailed(e.to_string()))?;
        file.metadata()
            .map(|m| m.len())
            .map_err(|e| ArchiveError::FinalizeFailed(e.to_string()).into())
    }

    fn remove_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial archive {}", self.path.display()),
            Err(e) => error!(
                "Failed to remove partial archive {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

impl Drop for ArchiveSink {
    fn drop(&mut self) {
        if self.writer.is_some() {
            error!(
                "Archive {} dropped before finalize, discarding",
                self.path.display()
            );
            self.writer = None;
            self.remove_file();
        }
    }
}

fn finish(writer: ZipWriter<BufWriter<File>>) -> Result<File> {
    let buffered = writer
        .finish()
        .map_err(|e| ArchiveError::FinalizeFailed(e.to_string()))?;
    let file = buffered
        .into_inner()
        .map_err(|e| ArchiveError::FinalizeFailed(e.error().to_string()))?;
    Ok(file)
}
