/*!
 * Region Cursor
 * Seekable sequential reader/writer bounded to one region of a mapping
 */

use super::mapping::SharedMapping;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Cursor over `[start, end)` of a shared mapping
///
/// Positions are relative to `start`. Writes stop at `end`, so an
/// oversized serializer sees a short write instead of spilling into the
/// neighbouring region.
pub struct RegionCursor<'a> {
    mapping: &'a SharedMapping,
    start: usize,
    end: usize,
    pos: usize,
}

impl<'a> RegionCursor<'a> {
    pub(super) fn new(mapping: &'a SharedMapping, start: usize, end: usize) -> Self {
        Self {
            mapping,
            start,
            end,
            pos: 0,
        }
    }

    /// Current position relative to the region start
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.pos)
    }
}

impl Read for RegionCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        self.mapping
            .read_into(self.start + self.pos, &mut buf[..n])
            .map_err(io::Error::other)?;
        self.pos += n;
        Ok(n)
    }
}

impl Write for RegionCursor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        self.mapping
            .write_at(self.start + self.pos, &buf[..n])
            .map_err(io::Error::other)?;
        self.pos += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for RegionCursor<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n as i128),
            SeekFrom::End(delta) => Some(self.capacity() as i128 + delta as i128),
            SeekFrom::Current(delta) => Some(self.pos as i128 + delta as i128),
        };
        match target {
            Some(t) if t >= 0 && t <= self.capacity() as i128 => {
                self.pos = t as usize;
                Ok(self.pos as u64)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside channel region",
            )),
        }
    }
}
