//! On-disk records and their byte codecs.
//!
//! All multi-byte integers are big-endian 16-bit signed. An inode slot is 15
//! bytes: an 11-byte NUL-padded UTF-8 name, the file size, and the head of the
//! block chain. A chain node is 4 bytes: the node's own block index (−1 when
//! free) and the index of the next node (−1 at the tail). A fully-zero inode
//! slot denotes an empty slot.

use cfs_error::{CfsError, Result};
use cfs_types::{BlockIndex, CHAIN_NODE_SIZE, INODE_SIZE, NAME_MAX, NO_BLOCK};

// ── Records ─────────────────────────────────────────────────────────────────

/// One occupied inode slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeEntry {
    /// File name, at most [`NAME_MAX`] bytes of UTF-8.
    pub name: String,
    /// File length in bytes. Bounded by the 16-bit on-disk field.
    pub size: u16,
    /// Head of the block chain, `None` for an empty file.
    pub first_block: Option<BlockIndex>,
}

impl InodeEntry {
    /// A freshly created, empty file.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            size: 0,
            first_block: None,
        }
    }
}

/// One chain-node slot. Pure data: two small signed indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainNode {
    /// Equals the node's own index when allocated, −1 when free.
    pub block_index: i16,
    /// Index of the next node in the chain, −1 at the tail.
    pub next: i16,
}

impl ChainNode {
    /// The unallocated state, `(-1, -1)`.
    pub const FREE: Self = Self {
        block_index: NO_BLOCK,
        next: NO_BLOCK,
    };

    /// Whether this slot is free (its block is not part of any chain).
    #[must_use]
    pub fn is_free(self) -> bool {
        self.block_index < 0
    }

    /// The next node in the chain, `None` at the tail.
    #[must_use]
    pub fn next_index(self) -> Option<BlockIndex> {
        BlockIndex::from_disk(self.next)
    }

    /// A node linking block `k` to `next`.
    #[must_use]
    pub fn linked(k: BlockIndex, next: Option<BlockIndex>) -> Self {
        Self {
            block_index: k.to_disk(),
            next: next.map_or(NO_BLOCK, BlockIndex::to_disk),
        }
    }
}

// ── Inode codec ─────────────────────────────────────────────────────────────

/// Encode an inode slot. `None` yields the all-zero empty slot.
///
/// The name writes exactly [`NAME_MAX`] bytes, truncated or zero-padded on
/// the right.
#[must_use]
pub fn encode_inode(entry: Option<&InodeEntry>) -> [u8; INODE_SIZE] {
    let mut buf = [0_u8; INODE_SIZE];
    let Some(entry) = entry else {
        return buf;
    };
    let name = entry.name.as_bytes();
    let n = name.len().min(NAME_MAX);
    buf[..n].copy_from_slice(&name[..n]);
    buf[NAME_MAX..NAME_MAX + 2].copy_from_slice(&entry.size.to_be_bytes());
    let first = entry.first_block.map_or(NO_BLOCK, BlockIndex::to_disk);
    buf[NAME_MAX + 2..].copy_from_slice(&first.to_be_bytes());
    buf
}

/// Decode an inode slot. A slot with an empty name decodes to `None`.
///
/// The name is the bytes up to (not including) the first NUL, as UTF-8, with
/// surrounding ASCII whitespace trimmed. Malformed UTF-8 is corruption.
pub fn decode_inode(buf: &[u8; INODE_SIZE]) -> Result<Option<InodeEntry>> {
    let field = &buf[..NAME_MAX];
    let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
    let name = std::str::from_utf8(&field[..end])
        .map_err(|_| CfsError::Corrupt("inode name is not valid UTF-8".to_owned()))?
        .trim_matches(|c: char| c.is_ascii_whitespace());
    if name.is_empty() {
        return Ok(None);
    }

    let size = i16::from_be_bytes([buf[NAME_MAX], buf[NAME_MAX + 1]]);
    let Ok(size) = u16::try_from(size) else {
        return Err(CfsError::Corrupt(format!(
            "inode '{name}' has negative size {size}"
        )));
    };
    let first = i16::from_be_bytes([buf[NAME_MAX + 2], buf[NAME_MAX + 3]]);

    Ok(Some(InodeEntry {
        name: name.to_owned(),
        size,
        first_block: BlockIndex::from_disk(first),
    }))
}

// ── Chain-node codec ────────────────────────────────────────────────────────

/// Encode a chain node as two big-endian i16 fields.
#[must_use]
pub fn encode_node(node: ChainNode) -> [u8; CHAIN_NODE_SIZE] {
    let mut buf = [0_u8; CHAIN_NODE_SIZE];
    buf[..2].copy_from_slice(&node.block_index.to_be_bytes());
    buf[2..].copy_from_slice(&node.next.to_be_bytes());
    buf
}

/// Decode a chain node. Never fails: any bit pattern is a valid record;
/// semantic validation happens when chains are walked.
#[must_use]
pub fn decode_node(buf: &[u8; CHAIN_NODE_SIZE]) -> ChainNode {
    ChainNode {
        block_index: i16::from_be_bytes([buf[0], buf[1]]),
        next: i16::from_be_bytes([buf[2], buf[3]]),
    }
}
