/*!
 * Shared Mapping
 * `MAP_SHARED` view over a file descriptor; both ends of a channel map the
 * same backing file, so writes on one side are visible on the other.
 */

use super::cursor::RegionCursor;
use super::types::ChannelError;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use std::num::NonZeroUsize;
use std::os::fd::AsFd;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU8, Ordering};

/// A read/write shared mapping of `len` bytes
///
/// Byte access goes through raw pointer copies. Callers coordinate through
/// the completion flag (acquire/release) so the two ends never touch the
/// same region concurrently.
pub struct SharedMapping {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain shared memory; synchronization is the flag protocol.
unsafe impl Send for SharedMapping {}
unsafe impl Sync for SharedMapping {}

impl SharedMapping {
    /// Map the first `len` bytes of `fd` shared and read/write
    pub fn map_fd<F: AsFd>(fd: F, len: usize) -> Result<Self, ChannelError> {
        let length = NonZeroUsize::new(len).ok_or(ChannelError::Empty)?;
        // SAFETY: fresh mapping chosen by the kernel; no existing memory is aliased.
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )
        }
        .map_err(ChannelError::Map)?;

        Ok(Self {
            ptr: ptr.cast(),
            len,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn check(&self, offset: usize, size: usize) -> Result<(), ChannelError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ChannelError::OutOfRange {
                offset,
                size,
                buffer_size: self.len,
            }),
        }
    }

    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<(), ChannelError> {
        self.check(offset, data.len())?;
        // SAFETY: range checked above; source is a distinct Rust slice.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
        Ok(())
    }

    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<(), ChannelError> {
        self.check(offset, buf.len())?;
        // SAFETY: range checked above; destination is a distinct Rust slice.
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    pub fn read_at(&self, offset: usize, size: usize) -> Result<Vec<u8>, ChannelError> {
        let mut buf = vec![0u8; size];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Fill `[offset, offset + size)` with `byte`
    pub fn fill(&self, offset: usize, size: usize, byte: u8) -> Result<(), ChannelError> {
        self.check(offset, size)?;
        // SAFETY: range checked above.
        unsafe {
            ptr::write_bytes(self.ptr.as_ptr().add(offset), byte, size);
        }
        Ok(())
    }

    fn atomic_byte(&self, offset: usize) -> Result<&AtomicU8, ChannelError> {
        self.check(offset, 1)?;
        // SAFETY: in range, AtomicU8 has alignment 1, and the mapping outlives `&self`.
        Ok(unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicU8) })
    }

    /// Acquire-load one byte; pairs with `store_byte`
    pub fn load_byte(&self, offset: usize) -> Result<u8, ChannelError> {
        Ok(self.atomic_byte(offset)?.load(Ordering::Acquire))
    }

    /// Release-store one byte; everything written before it becomes visible
    /// to whoever observes the new value
    pub fn store_byte(&self, offset: usize, byte: u8) -> Result<(), ChannelError> {
        self.atomic_byte(offset)?.store(byte, Ordering::Release);
        Ok(())
    }

    /// Sequential cursor over `[start, end)`
    pub fn cursor(&self, start: usize, end: usize) -> Result<RegionCursor<'_>, ChannelError> {
        if start > end {
            return Err(ChannelError::OutOfRange {
                offset: start,
                size: 0,
                buffer_size: self.len,
            });
        }
        self.check(start, end - start)?;
        Ok(RegionCursor::new(self, start, end))
    }
}

impl Drop for SharedMapping {
    fn drop(&mut self) {
        // SAFETY: ptr/len come from a successful mmap and are unmapped once.
        if let Err(e) = unsafe { munmap(self.ptr.cast(), self.len) } {
            tracing::warn!(error = %e, len = self.len, "munmap failed");
        }
    }
}

impl std::fmt::Debug for SharedMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMapping")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn backing(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.as_file_mut().set_len(len as u64).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_two_mappings_see_same_bytes() {
        let file = backing(4096);
        let a = SharedMapping::map_fd(file.as_file(), 4096).unwrap();
        let b = SharedMapping::map_fd(file.as_file(), 4096).unwrap();

        a.write_at(100, b"shared data").unwrap();
        assert_eq!(b.read_at(100, 11).unwrap(), b"shared data");

        b.store_byte(4000, 7).unwrap();
        assert_eq!(a.load_byte(4000).unwrap(), 7);
    }

    #[test]
    fn test_zero_initialized() {
        let file = backing(1024);
        let map = SharedMapping::map_fd(file.as_file(), 1024).unwrap();
        assert!(map.read_at(0, 1024).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_range() {
        let file = backing(256);
        let map = SharedMapping::map_fd(file.as_file(), 256).unwrap();
        map.fill(16, 32, 0xAB).unwrap();

        let bytes = map.read_at(0, 64).unwrap();
        assert!(bytes[..16].iter().all(|&b| b == 0));
        assert!(bytes[16..48].iter().all(|&b| b == 0xAB));
        assert!(bytes[48..].iter().all(|&b| b == 0));
        assert!(map.fill(250, 10, 1).is_err());
    }

    #[test]
    fn test_out_of_range() {
        let file = backing(64);
        let map = SharedMapping::map_fd(file.as_file(), 64).unwrap();
        assert!(matches!(
            map.write_at(60, b"too long"),
            Err(ChannelError::OutOfRange { offset: 60, size: 8, buffer_size: 64 })
        ));
        assert!(map.read_at(usize::MAX, 2).is_err());
        assert!(map.load_byte(64).is_err());
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let file = backing(64);
        assert!(matches!(
            SharedMapping::map_fd(file.as_file(), 0),
            Err(ChannelError::Empty)
        ));
    }
}
