//! Property-based tests for BufferArray positional access.

use proptest::prelude::*;
use weft::BufferArray;

/// Small block sizes so a few dozen bytes already span several blocks
fn block_size() -> impl Strategy<Value = usize> {
    1usize..=17
}

fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..8)
}

fn filled(block_size: usize, data: &[u8]) -> BufferArray {
    let mut buffer = BufferArray::with_block_size(block_size);
    assert_eq!(buffer.append(data), data.len());
    buffer
}

proptest! {
    /// Appending chunks of any size reads back as their concatenation
    #[test]
    fn append_then_read_round_trips(size in block_size(), parts in chunks()) {
        let mut buffer = BufferArray::with_block_size(size);
        let mut expected = Vec::new();
        for part in &parts {
            prop_assert_eq!(buffer.append(part), part.len());
            expected.extend_from_slice(part);
        }

        prop_assert_eq!(buffer.len(), expected.len());
        let mut dst = vec![0u8; expected.len()];
        prop_assert_eq!(buffer.read(0, &mut dst), expected.len());
        prop_assert_eq!(dst, expected);

        // Every block but the last is full
        let blocks: Vec<&[u8]> = buffer.blocks().collect();
        if let Some((_, full)) = blocks.split_last() {
            prop_assert!(full.iter().all(|b| b.len() == size));
        }
    }

    /// Overwriting inside the buffer keeps the length and touches only the
    /// target range
    #[test]
    fn write_in_place_overwrites_exact_range(
        size in block_size(),
        data in prop::collection::vec(any::<u8>(), 1..100),
        patch in prop::collection::vec(any::<u8>(), 1..30),
        pos_seed in any::<usize>(),
    ) {
        prop_assume!(patch.len() <= data.len());
        let pos = pos_seed % (data.len() - patch.len() + 1);

        let mut buffer = filled(size, &data);
        prop_assert_eq!(buffer.write(pos, &patch), patch.len());
        prop_assert_eq!(buffer.len(), data.len());

        let mut expected = data.clone();
        expected[pos..pos + patch.len()].copy_from_slice(&patch);
        prop_assert_eq!(buffer.to_vec(), expected);
    }

    /// Writing at the end is an append
    #[test]
    fn write_at_end_matches_append(
        size in block_size(),
        head in prop::collection::vec(any::<u8>(), 0..50),
        tail in prop::collection::vec(any::<u8>(), 0..50),
    ) {
        let mut written = filled(size, &head);
        let mut appended = filled(size, &head);

        prop_assert_eq!(written.write(head.len(), &tail), tail.len());
        prop_assert_eq!(appended.append(&tail), tail.len());
        prop_assert_eq!(written.to_vec(), appended.to_vec());
        prop_assert_eq!(written.block_count(), appended.block_count());
    }

    /// Out-of-range reads and writes change nothing
    #[test]
    fn out_of_range_access_is_a_noop(
        size in block_size(),
        data in prop::collection::vec(any::<u8>(), 0..60),
        past in 1usize..100,
    ) {
        let mut buffer = filled(size, &data);

        let mut dst = [0x5Au8; 8];
        prop_assert_eq!(buffer.read(data.len(), &mut dst), 0);
        prop_assert_eq!(buffer.read(data.len() + past, &mut dst), 0);
        prop_assert_eq!(dst, [0x5A; 8]);

        prop_assert_eq!(buffer.write(data.len() + past, b"xyz"), 0);
        prop_assert_eq!(buffer.to_vec(), data);
    }

    /// Block lookup agrees with the block layout
    #[test]
    fn find_block_decomposes_position(
        size in block_size(),
        data in prop::collection::vec(any::<u8>(), 1..120),
        pos_seed in any::<usize>(),
    ) {
        let buffer = filled(size, &data);
        let pos = pos_seed % data.len();

        let (index, offset) = buffer.find_block(pos).unwrap();
        prop_assert_eq!(index * size + offset, pos);
        prop_assert!(offset < size);
        prop_assert_eq!(buffer.block_start_end(index).unwrap()[offset], data[pos]);
        prop_assert!(buffer.find_block(data.len()).is_none());
    }
}

#[test]
fn append_spanning_blocks_reads_across_boundary() {
    let mut buffer = BufferArray::with_block_size(16);
    buffer.append(b"0123456789");
    buffer.append(b"ABCDEFGHIJKLMNOP");
    assert_eq!(buffer.len(), 26);

    let mut dst = [0u8; 10];
    assert_eq!(buffer.read(8, &mut dst), 10);
    assert_eq!(&dst, b"89ABCDEFGH");
}
