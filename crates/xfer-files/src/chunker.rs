//! Windowed file reads and temp-file commits.
//!
//! Outgoing transfers read their source a window at a time with
//! [`WindowReader`]; incoming transfers append to a temp file with
//! [`TempFileWriter`] and move it into place only once the last packet lands.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Source file reader with seek support.
#[derive(Debug)]
pub struct WindowReader {
    file: File,
    path: PathBuf,
    total_size: u64,
}

impl WindowReader {
    /// Open a file for windowed reading
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or metadata cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let total_size = file.metadata()?.len();

        Ok(Self {
            file,
            path,
            total_size,
        })
    }

    /// Total file size at open time
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Path this reader was opened on
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read up to `max_len` bytes starting at `offset`
    ///
    /// The result is shorter than `max_len` only at end of file; an offset at
    /// or past the end yields an empty window.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or reading fails.
    pub fn read_window(&mut self, offset: u64, max_len: usize) -> io::Result<Vec<u8>> {
        if offset >= self.total_size {
            return Ok(Vec::new());
        }

        let remaining = self.total_size - offset;
        let len = remaining.min(max_len as u64) as usize;
        let mut buffer = vec![0u8; len];

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }
}

/// Sequential writer for a transfer's temp file.
#[derive(Debug)]
pub struct TempFileWriter {
    file: File,
    temp_path: PathBuf,
    written: u64,
}

impl TempFileWriter {
    /// Create (or truncate) the temp file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(temp_path: P) -> io::Result<Self> {
        let temp_path = temp_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(Self {
            file,
            temp_path,
            written: 0,
        })
    }

    /// Append bytes at the end of what has been written so far
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Temp file location
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Sync the temp file and move it to `final_path`
    ///
    /// Any existing file at `final_path` is replaced by the move itself and
    /// left untouched if the move fails.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing or moving fails.
    pub fn commit<P: AsRef<Path>>(self, final_path: P) -> io::Result<()> {
        let final_path = final_path.as_ref();
        self.file.sync_all()?;
        drop(self.file);

        rename_or_copy(&self.temp_path, final_path)
    }

    /// Close and delete the temp file
    pub fn discard(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.temp_path) {
            tracing::debug!(
                "Could not remove temp file {}: {}",
                self.temp_path.display(),
                e
            );
        }
    }
}

/// Move `from` to `to`, copying then deleting when a rename is refused
/// (e.g. across mount points).
///
/// # Errors
///
/// Returns an error if both the rename and the copy fail.
pub fn rename_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                "Rename {} -> {} failed ({}), copying instead",
                from.display(),
                to.display(),
                rename_err
            );
            fs::copy(from, to)?;
            if let Err(e) = fs::remove_file(from) {
                tracing::warn!("Copied {} but could not remove it: {}", from.display(), e);
            }
            Ok(())
        }
    }
}
