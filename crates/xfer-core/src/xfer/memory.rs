//! In-memory transfers.

use super::{Endpoint, RemoteSource};
use crate::error::{ErrorCode, XferStatus};
use xfer_files::LocationKind;

#[derive(Debug)]
enum Role {
    Send {
        data: Vec<u8>,
    },
    Receive {
        remote_filename: String,
        remote_location: LocationKind,
        delete_remote_on_completion: bool,
    },
}

/// Transfer backed by a byte buffer. Downloads are delivered with the
/// completion; nothing touches the filesystem.
#[derive(Debug)]
pub struct MemoryXfer {
    role: Role,
}

impl MemoryXfer {
    /// Serve `data`.
    pub(crate) fn sender(data: Vec<u8>) -> Self {
        Self {
            role: Role::Send { data },
        }
    }

    /// Download `remote_filename` (empty for a registered transfer) into memory.
    pub(crate) fn receiver(
        remote_filename: impl Into<String>,
        remote_location: LocationKind,
        delete_remote_on_completion: bool,
    ) -> Self {
        Self {
            role: Role::Receive {
                remote_filename: remote_filename.into(),
                remote_location,
                delete_remote_on_completion,
            },
        }
    }

    /// Bytes being served, for senders.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.role {
            Role::Send { data } => Some(data),
            Role::Receive { .. } => None,
        }
    }
}

impl Endpoint for MemoryXfer {
    fn open_source(&mut self) -> Result<u64, ErrorCode> {
        match &self.role {
            Role::Send { data } => Ok(data.len() as u64),
            Role::Receive { .. } => Err(ErrorCode::FileNotFound),
        }
    }

    fn read_source(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>, ErrorCode> {
        let Role::Send { data } = &self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(max_len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn buffers_in_memory(&self) -> bool {
        true
    }

    fn prepare_sink(&mut self) -> XferStatus {
        Ok(())
    }

    fn write_sink(&mut self, _data: &[u8]) -> XferStatus {
        Ok(())
    }

    fn commit_sink(&mut self) -> XferStatus {
        Ok(())
    }

    fn discard_sink(&mut self) {}

    fn request(&self) -> RemoteSource {
        match &self.role {
            Role::Receive {
                remote_filename,
                remote_location,
                delete_remote_on_completion,
            } => RemoteSource {
                filename: remote_filename.clone(),
                location: *remote_location,
                delete_on_completion: *delete_remote_on_completion,
                object: None,
            },
            Role::Send { .. } => RemoteSource {
                filename: String::new(),
                location: LocationKind::None,
                delete_on_completion: false,
                object: None,
            },
        }
    }

    fn describe(&self) -> String {
        match &self.role {
            Role::Send { data } => format!("memory ({} bytes)", data.len()),
            Role::Receive {
                remote_filename, ..
            } if remote_filename.is_empty() => "registered memory".to_string(),
            Role::Receive {
                remote_filename, ..
            } => format!("memory <- {remote_filename}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_source_bounds() {
        let mut xfer = MemoryXfer::sender(b"0123456789".to_vec());
        assert_eq!(xfer.open_source(), Ok(10));
        assert_eq!(xfer.read_source(8, 100).unwrap(), b"89");
        assert!(xfer.read_source(20, 5).unwrap().is_empty());
        assert_eq!(xfer.data(), Some(&b"0123456789"[..]));
    }

    #[test]
    fn test_registered_request_is_bare() {
        let xfer = MemoryXfer::receiver("", LocationKind::None, false);
        let request = xfer.request();
        assert!(request.filename.is_empty());
        assert_eq!(request.location, LocationKind::None);
        assert!(request.object.is_none());
        assert_eq!(xfer.describe(), "registered memory");
    }
}
