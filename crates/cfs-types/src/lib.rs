#![forbid(unsafe_code)]
//! Disk geometry for the ChainFS simulated disk.
//!
//! The backing file is a fixed-layout image: a metadata region holding the
//! inode table and the chain-node table, rounded up to a whole block, followed
//! by the data region. Every constant here is fixed at compile time; the image
//! never grows or shrinks.

use std::fmt;

// ── Layout constants ────────────────────────────────────────────────────────

/// Number of inode slots (maximum number of files).
pub const MAX_FILES: usize = 5;

/// Number of data blocks (and chain-node slots).
pub const MAX_BLOCKS: usize = 10;

/// Size of one data block in bytes.
pub const BLOCK_SIZE: usize = 128;

/// Maximum file-name length in bytes (UTF-8, NUL-padded on disk).
pub const NAME_MAX: usize = 11;

/// On-disk size of one inode entry: 11-byte name + i16 size + i16 first block.
pub const INODE_SIZE: usize = NAME_MAX + 2 + 2;

/// On-disk size of one chain node: i16 block index + i16 next.
pub const CHAIN_NODE_SIZE: usize = 4;

/// Total metadata bytes before rounding (5 * 15 + 10 * 4 = 115).
pub const METADATA_SIZE: usize = MAX_FILES * INODE_SIZE + MAX_BLOCKS * CHAIN_NODE_SIZE;

/// Start of the data region: metadata rounded up to a whole block (128).
pub const DATA_START: u64 = (METADATA_SIZE as u64).div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64;

/// Total length of the backing file (1408).
pub const IMAGE_LEN: u64 = DATA_START + (MAX_BLOCKS * BLOCK_SIZE) as u64;

/// Largest value the 16-bit on-disk size field can carry.
pub const SIZE_FIELD_MAX: usize = i16::MAX as usize;

/// Sentinel for "no block" / "free" in the i16 on-disk fields.
pub const NO_BLOCK: i16 = -1;

// ── Index newtypes ──────────────────────────────────────────────────────────

/// Index of a data block (and of its chain node) in `[0, MAX_BLOCKS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(pub usize);

impl BlockIndex {
    /// Byte offset of this block's data region in the image.
    #[must_use]
    pub fn data_offset(self) -> u64 {
        DATA_START + (self.0 * BLOCK_SIZE) as u64
    }

    /// Byte offset of this block's chain node in the metadata region.
    #[must_use]
    pub fn node_offset(self) -> u64 {
        (MAX_FILES * INODE_SIZE + self.0 * CHAIN_NODE_SIZE) as u64
    }

    /// Interpret an on-disk i16 field, `None` for the −1 sentinel.
    ///
    /// Out-of-range non-negative values are NOT rejected here; the chain
    /// engine treats them as corruption when it walks the chain.
    #[must_use]
    pub fn from_disk(raw: i16) -> Option<Self> {
        usize::try_from(raw).ok().map(Self)
    }

    /// The on-disk i16 form of this index.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn to_disk(self) -> i16 {
        self.0 as i16
    }

    /// Whether this index addresses a real block.
    #[must_use]
    pub fn in_range(self) -> bool {
        self.0 < MAX_BLOCKS
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an inode slot in `[0, MAX_FILES)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub usize);

impl SlotIndex {
    /// Byte offset of this inode slot in the metadata region.
    #[must_use]
    pub fn inode_offset(self) -> u64 {
        (self.0 * INODE_SIZE) as u64
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of blocks needed to hold `len` content bytes.
#[must_use]
pub fn blocks_needed(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE)
}
