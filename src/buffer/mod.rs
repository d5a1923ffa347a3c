//! Scatter/gather buffers for streaming I/O
//!
//! Design: producers `append`/`write` into a [`BufferArray`], consumers read
//! positionally or take the filled block regions directly for vectored
//! writes. [`BufferStream`] layers a cursor and `std::io` traits on top.

mod array;
mod block;
mod stream;


pub use array::BufferArray;
pub use block::Block;
pub use stream::BufferStream;

/// Default block capacity: 64KiB plus room for a 4-byte chunk header
pub const DEFAULT_BLOCK_SIZE: usize = 65540;
