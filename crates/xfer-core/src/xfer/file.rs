//! Local file transfers.

use super::{Endpoint, RemoteSource};
use crate::error::{ErrorCode, XferStatus};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use xfer_files::{LocationKind, TempFileWriter, WindowReader};

#[derive(Debug)]
enum Role {
    Send {
        path: PathBuf,
        delete_on_completion: bool,
        reader: Option<WindowReader>,
    },
    Receive {
        local_path: PathBuf,
        remote_filename: String,
        remote_location: LocationKind,
        delete_remote_on_completion: bool,
        temp_path: PathBuf,
        writer: Option<TempFileWriter>,
    },
}

/// Transfer backed by a local file.
///
/// Downloads land in a temp file that is moved over the local path only
/// once the last packet has been written.
#[derive(Debug)]
pub struct FileXfer {
    role: Role,
}

impl FileXfer {
    /// Serve `path`, deleting it after the last packet is confirmed when
    /// `delete_on_completion` is set.
    pub(crate) fn sender(path: PathBuf, delete_on_completion: bool) -> Self {
        Self {
            role: Role::Send {
                path,
                delete_on_completion,
                reader: None,
            },
        }
    }

    /// Download `remote_filename` into `local_path`, staging in `temp_path`.
    pub(crate) fn receiver(
        local_path: PathBuf,
        remote_filename: String,
        remote_location: LocationKind,
        delete_remote_on_completion: bool,
        temp_path: PathBuf,
    ) -> Self {
        Self {
            role: Role::Receive {
                local_path,
                remote_filename,
                remote_location,
                delete_remote_on_completion,
                temp_path,
                writer: None,
            },
        }
    }

    /// Local file being served or written.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        match &self.role {
            Role::Send { path, .. } => path,
            Role::Receive { local_path, .. } => local_path,
        }
    }

    /// Remote name and location, for downloads.
    #[must_use]
    pub fn remote_filename(&self) -> Option<(&str, LocationKind)> {
        match &self.role {
            Role::Send { .. } => None,
            Role::Receive {
                remote_filename,
                remote_location,
                ..
            } => Some((remote_filename, *remote_location)),
        }
    }

    /// Staging file, for downloads.
    #[must_use]
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.role {
            Role::Send { .. } => None,
            Role::Receive { temp_path, .. } => Some(temp_path),
        }
    }

    pub(crate) fn matches_local_filename(&self, path: &Path) -> bool {
        matches!(&self.role, Role::Receive { local_path, .. } if local_path == path)
    }

    pub(crate) fn matches_remote_filename(&self, name: &str, location: LocationKind) -> bool {
        self.remote_filename() == Some((name, location))
    }
}

fn open_error(path: &Path, err: &io::Error) -> ErrorCode {
    tracing::warn!("Cannot open {} for xfer: {}", path.display(), err);
    match err.kind() {
        io::ErrorKind::NotFound => ErrorCode::FileNotFound,
        _ => ErrorCode::CannotOpenFile,
    }
}

impl Endpoint for FileXfer {
    fn open_source(&mut self) -> Result<u64, ErrorCode> {
        let Role::Send { path, reader, .. } = &mut self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        let opened = WindowReader::open(&*path).map_err(|e| open_error(path.as_path(), &e))?;
        let size = opened.total_size();
        *reader = Some(opened);
        Ok(size)
    }

    fn read_source(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>, ErrorCode> {
        let Role::Send {
            path,
            reader: Some(reader),
            ..
        } = &mut self.role
        else {
            return Err(ErrorCode::CannotOpenFile);
        };
        reader.read_window(offset, max_len).map_err(|e| {
            tracing::warn!("Read of {} at {} failed: {}", path.display(), offset, e);
            ErrorCode::CannotOpenFile
        })
    }

    fn close_handle(&mut self) {
        if let Role::Send { reader, .. } = &mut self.role {
            *reader = None;
        }
    }

    fn reopen_handle(&mut self) -> XferStatus {
        let Role::Send { path, reader, .. } = &mut self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        if reader.is_none() {
            let opened = WindowReader::open(&*path).map_err(|e| {
                tracing::warn!("Cannot reopen {}: {}", path.display(), e);
                ErrorCode::CannotOpenFile
            })?;
            *reader = Some(opened);
        }
        Ok(())
    }

    fn finish_send(&mut self) {
        if let Role::Send {
            path,
            delete_on_completion: true,
            ..
        } = &self.role
        {
            match fs::remove_file(path) {
                Ok(()) => tracing::info!("Removed {} after xfer", path.display()),
                Err(e) => tracing::warn!("Could not remove {} after xfer: {}", path.display(), e),
            }
        }
    }

    fn prepare_sink(&mut self) -> XferStatus {
        let Role::Receive {
            temp_path, writer, ..
        } = &mut self.role
        else {
            return Err(ErrorCode::CannotOpenFile);
        };
        let created = TempFileWriter::create(&*temp_path).map_err(|e| {
            tracing::warn!("Cannot create {}: {}", temp_path.display(), e);
            ErrorCode::CannotOpenFile
        })?;
        *writer = Some(created);
        Ok(())
    }

    fn write_sink(&mut self, data: &[u8]) -> XferStatus {
        let Role::Receive {
            temp_path,
            writer: Some(writer),
            ..
        } = &mut self.role
        else {
            return Err(ErrorCode::CannotOpenFile);
        };
        writer.append(data).map_err(|e| {
            tracing::warn!("Write to {} failed: {}", temp_path.display(), e);
            ErrorCode::CannotOpenFile
        })
    }

    fn commit_sink(&mut self) -> XferStatus {
        let Role::Receive {
            local_path, writer, ..
        } = &mut self.role
        else {
            return Err(ErrorCode::CannotOpenFile);
        };
        let Some(writer) = writer.take() else {
            return Err(ErrorCode::CannotOpenFile);
        };
        writer.commit(&*local_path).map_err(|e| {
            tracing::warn!("Cannot move xfer into {}: {}", local_path.display(), e);
            ErrorCode::CannotOpenFile
        })
    }

    fn discard_sink(&mut self) {
        if let Role::Receive { writer, .. } = &mut self.role {
            if let Some(writer) = writer.take() {
                writer.discard();
            }
        }
    }

    fn request(&self) -> RemoteSource {
        match &self.role {
            Role::Receive {
                remote_filename,
                remote_location,
                delete_remote_on_completion,
                ..
            } => RemoteSource {
                filename: remote_filename.clone(),
                location: *remote_location,
                delete_on_completion: *delete_remote_on_completion,
                object: None,
            },
            Role::Send { path, .. } => RemoteSource {
                filename: path.to_string_lossy().into_owned(),
                location: LocationKind::None,
                delete_on_completion: false,
                object: None,
            },
        }
    }

    fn describe(&self) -> String {
        self.local_path().display().to_string()
    }
}

impl Drop for FileXfer {
    fn drop(&mut self) {
        self.discard_sink();
    }
}
