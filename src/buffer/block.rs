//! Fixed-capacity byte block

use crate::error::BufferError;

/// One chunk of a [`BufferArray`](super::BufferArray).
///
/// The backing allocation is made once at construction and never grows, so
/// slices handed out for gather I/O stay valid while the buffer only appends.
pub struct Block {
    data: Vec<u8>,
    capacity: usize,
}

impl Block {
    /// Empty block with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BufferError::AllocFailed { bytes: capacity })?;
        Ok(Self { data, capacity })
    }

    /// Block of `capacity` bytes holding a copy of `data`
    pub fn from_slice(data: &[u8], capacity: usize) -> Result<Self, BufferError> {
        if data.len() > capacity {
            return Err(BufferError::OutOfRange {
                requested: data.len(),
                available: capacity,
            });
        }
        let mut block = Self::with_capacity(capacity)?;
        block.data.extend_from_slice(data);
        Ok(block)
    }

    /// Append all of `data`, or nothing if it does not fit
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        if data.len() > self.remaining() {
            return Err(BufferError::OutOfRange {
                requested: data.len(),
                available: self.remaining(),
            });
        }
        self.data.extend_from_slice(data);
        Ok(())
    }

    /// Append as much of `data` as fits; returns the count taken
    pub fn fill_from(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        self.data.extend_from_slice(&data[..take]);
        take
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// The filled region
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
