//! `std::io` adapter over a [`BufferArray`]

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::{Deref, DerefMut};

use super::BufferArray;

/// Cursor over a buffer
///
/// Works with anything that dereferences to a `BufferArray`: `&BufferArray`
/// or a `RefPtr` for reading and seeking, `&mut BufferArray` or
/// `Box<BufferArray>` for writing as well.
#[derive(Debug)]
pub struct BufferStream<B> {
    buffer: B,
    pos: u64,
}

impl<B: Deref<Target = BufferArray>> BufferStream<B> {
    pub fn new(buffer: B) -> Self {
        Self { buffer, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// Bytes between the cursor and the end
    pub fn remaining(&self) -> usize {
        usize::try_from(self.pos)
            .map(|pos| self.buffer.len().saturating_sub(pos))
            .unwrap_or(0)
    }

    pub fn get_ref(&self) -> &BufferArray {
        &self.buffer
    }

    pub fn into_inner(self) -> B {
        self.buffer
    }
}

impl<B: Deref<Target = BufferArray>> Read for BufferStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(pos) = usize::try_from(self.pos) else {
            return Ok(0);
        };
        let count = self.buffer.read(pos, buf);
        self.pos += count as u64;
        Ok(count)
    }
}

impl<B: DerefMut<Target = BufferArray>> Write for BufferStream<B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let pos = usize::try_from(self.pos)
            .ok()
            .filter(|&pos| pos <= self.buffer.len())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "write position past end of buffer")
            })?;

        let count = self.buffer.write(pos, buf);
        if count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "buffer block allocation failed",
            ));
        }
        self.pos += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<B: Deref<Target = BufferArray>> Seek for BufferStream<B> {
    fn seek(&mut self, style: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match style {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.buffer.len() as u64, n),
            SeekFrom::Current(n) => (self.pos, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
