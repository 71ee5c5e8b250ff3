/*!
 * Channel
 * Backing file plus shared mapping owned by one worker
 */

use super::cursor::RegionCursor;
use super::mapping::SharedMapping;
use super::types::{ChannelError, CompletionFlag};
use crate::config::WorkerConfig;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// The controller's end of a worker channel
///
/// Layout:
///
/// ```text
/// 0                      return_offset  return_offset+1            size
/// |  payload region      | flag |  encoded outcome                  |
/// ```
pub struct Channel {
    mapping: SharedMapping,
    file: NamedTempFile,
    path: PathBuf,
    size: usize,
    return_offset: usize,
}

impl Channel {
    /// Create a zero-filled backing file and map it
    pub fn create(config: &WorkerConfig) -> Result<Self, ChannelError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("subworker-").suffix(".buf");
        let file = match &config.backing_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.as_file().set_len(config.buffer_size as u64)?;

        let mapping = SharedMapping::map_fd(file.as_file(), config.buffer_size)?;
        let path = file.path().to_path_buf();
        debug!(path = %path.display(), size = config.buffer_size, "channel created");

        Ok(Self {
            mapping,
            file,
            path,
            size: config.buffer_size,
            return_offset: config.return_offset,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn return_offset(&self) -> usize {
        self.return_offset
    }

    #[inline]
    pub fn payload_capacity(&self) -> usize {
        self.return_offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptor the worker maps to reach the same storage
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_file().as_raw_fd()
    }

    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), ChannelError> {
        self.mapping.write_at(offset, data)
    }

    /// Read up to `max_len` bytes, clamped to the end of the buffer
    pub fn read(&self, offset: usize, max_len: usize) -> Result<Vec<u8>, ChannelError> {
        if offset > self.size {
            return Err(ChannelError::OutOfRange {
                offset,
                size: max_len,
                buffer_size: self.size,
            });
        }
        let len = max_len.min(self.size - offset);
        self.mapping.read_at(offset, len)
    }

    pub fn cursor(&self, start: usize, end: usize) -> Result<RegionCursor<'_>, ChannelError> {
        self.mapping.cursor(start, end)
    }

    /// Cursor over the payload region
    pub fn payload(&self) -> Result<RegionCursor<'_>, ChannelError> {
        self.mapping.cursor(0, self.return_offset)
    }

    /// Cursor over the return region after the flag byte
    pub fn outcome(&self) -> Result<RegionCursor<'_>, ChannelError> {
        self.mapping.cursor(self.return_offset + 1, self.size)
    }

    pub fn flag(&self) -> CompletionFlag {
        // return_offset is validated to lie inside the mapping
        self.mapping
            .load_byte(self.return_offset)
            .map(CompletionFlag::from_byte)
            .unwrap_or(CompletionFlag::Pending)
    }

    pub fn set_flag(&self, flag: CompletionFlag) -> Result<(), ChannelError> {
        self.mapping.store_byte(self.return_offset, flag.to_byte())
    }

    /// Unmap, close and unlink the backing file
    pub fn close(self) -> Result<(), ChannelError> {
        let Channel {
            mapping, file, path, ..
        } = self;
        drop(mapping);
        file.close()?;
        debug!(path = %path.display(), "channel closed");
        Ok(())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("return_offset", &self.return_offset)
            .finish()
    }
}
