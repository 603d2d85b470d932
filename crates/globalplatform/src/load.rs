//! Load file block sequencing
//!
//! This module chunks an already-encoded load file data block (the `C4` TLV
//! produced by external CAP tooling) into the numbered blocks carried by
//! LOAD commands. Parsing CAP archives is out of scope; callers hand over
//! the raw bytes.

use crate::{Error, Result};

/// Default block size when no secure channel overhead applies
pub const DEFAULT_BLOCK_SIZE: usize = 255;

/// A stream of LOAD command blocks over load file data
#[derive(Debug)]
pub struct LoadCommandStream {
    /// Load file data
    data: Vec<u8>,
    /// Current position in data
    position: usize,
    /// Block size in bytes
    block_size: usize,
    /// Total blocks count
    blocks_count: usize,
    /// Current block index
    current_block: usize,
}

impl LoadCommandStream {
    /// Create a stream over load file data with the default block size
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let blocks_count = data.len().div_ceil(DEFAULT_BLOCK_SIZE);
        Self {
            data,
            position: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            blocks_count,
            current_block: 0,
        }
    }

    /// Create a stream with a caller-chosen block size
    ///
    /// The block size must be between 1 and 255; secure channels reduce it
    /// by their MAC and padding overhead.
    pub fn with_block_size(data: impl Into<Vec<u8>>, block_size: usize) -> Result<Self> {
        if block_size == 0 || block_size > DEFAULT_BLOCK_SIZE {
            return Err(Error::Config("block size must be between 1 and 255"));
        }

        let data = data.into();
        let blocks_count = data.len().div_ceil(block_size);
        Ok(Self {
            data,
            position: 0,
            block_size,
            blocks_count,
            current_block: 0,
        })
    }

    /// Get the total number of blocks
    pub const fn blocks_count(&self) -> usize {
        self.blocks_count
    }

    /// Get the index of the next block
    pub const fn current_block(&self) -> usize {
        self.current_block
    }

    /// Check if there are more blocks
    pub const fn has_next(&self) -> bool {
        self.position < self.data.len()
    }

    /// Get the next block: (is_last, block_number, block_data)
    pub fn next_block(&mut self) -> Option<(bool, u8, &[u8])> {
        if !self.has_next() {
            return None;
        }

        let remaining = self.data.len() - self.position;
        let size = remaining.min(self.block_size);
        let is_last = remaining <= self.block_size;

        let block_number = self.current_block as u8;
        let block = &self.data[self.position..self.position + size];

        self.position += size;
        self.current_block += 1;

        Some((is_last, block_number, block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block() {
        let mut stream = LoadCommandStream::new(vec![0xC4, 0x02, 0xAA, 0xBB]);
        assert_eq!(stream.blocks_count(), 1);

        let (is_last, number, block) = stream.next_block().unwrap();
        assert!(is_last);
        assert_eq!(number, 0);
        assert_eq!(block, &[0xC4, 0x02, 0xAA, 0xBB]);
        assert!(stream.next_block().is_none());
    }

    #[test]
    fn test_block_sequencing() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut stream = LoadCommandStream::with_block_size(data.clone(), 100).unwrap();
        assert_eq!(stream.blocks_count(), 3);

        let (is_last, number, block) = stream.next_block().unwrap();
        assert!(!is_last);
        assert_eq!(number, 0);
        assert_eq!(block, &data[..100]);

        let (is_last, number, _) = stream.next_block().unwrap();
        assert!(!is_last);
        assert_eq!(number, 1);

        let (is_last, number, block) = stream.next_block().unwrap();
        assert!(is_last);
        assert_eq!(number, 2);
        assert_eq!(block.len(), 56);

        assert!(!stream.has_next());
    }

    #[test]
    fn test_exact_multiple_of_block_size() {
        let mut stream = LoadCommandStream::with_block_size(vec![0u8; 200], 100).unwrap();
        assert_eq!(stream.blocks_count(), 2);

        assert!(!stream.next_block().unwrap().0);
        let (is_last, number, block) = stream.next_block().unwrap();
        assert!(is_last);
        assert_eq!(number, 1);
        assert_eq!(block.len(), 100);
    }

    #[test]
    fn test_invalid_block_size() {
        assert!(LoadCommandStream::with_block_size(vec![0u8; 10], 0).is_err());
        assert!(LoadCommandStream::with_block_size(vec![0u8; 10], 256).is_err());
    }
}
