//! The block-chain engine.
//!
//! A file's content lives in a linked list of data blocks: the inode names
//! the head, each chain node names its successor, −1 terminates. Walks are
//! defensive: an index outside the data region or a revisited node is
//! corruption, never a panic or an endless loop.

use crate::alloc::FreeList;
use crate::codec::{ChainNode, encode_node};
use cfs_block::DiskImage;
use cfs_error::{CfsError, Result};
use cfs_types::{BLOCK_SIZE, BlockIndex, MAX_BLOCKS, blocks_needed};
use tracing::trace;

/// Walk a chain to its tail, returning every visited block index.
///
/// Used for load-time validation and by tests; READ uses [`collect_chain`],
/// which also halts once the file size is covered.
pub fn walk_chain(
    nodes: &[ChainNode; MAX_BLOCKS],
    first: Option<BlockIndex>,
) -> Result<Vec<BlockIndex>> {
    let mut out = Vec::new();
    let mut visited = [false; MAX_BLOCKS];
    let mut cur = first;
    while let Some(k) = cur {
        if !k.in_range() {
            return Err(CfsError::Corrupt(format!(
                "chain references block {k} outside the data region"
            )));
        }
        if visited[k.0] {
            return Err(CfsError::Corrupt(format!("chain cycles at block {k}")));
        }
        visited[k.0] = true;
        out.push(k);
        cur = nodes[k.0].next_index();
    }
    Ok(out)
}

/// The block indices READ must visit for a file of `size` bytes.
///
/// Halts at the chain tail or once `ceil(size / BLOCK_SIZE)` nodes are
/// collected, whichever comes first. A zero-size file yields no blocks.
pub fn collect_chain(
    nodes: &[ChainNode; MAX_BLOCKS],
    first: Option<BlockIndex>,
    size: usize,
) -> Result<Vec<BlockIndex>> {
    let want = blocks_needed(size);
    let mut out = Vec::with_capacity(want);
    let mut visited = [false; MAX_BLOCKS];
    let mut cur = first;
    while let Some(k) = cur {
        if out.len() == want {
            break;
        }
        if !k.in_range() {
            return Err(CfsError::Corrupt(format!(
                "chain references block {k} outside the data region"
            )));
        }
        if visited[k.0] {
            return Err(CfsError::Corrupt(format!("chain cycles at block {k}")));
        }
        visited[k.0] = true;
        out.push(k);
        cur = nodes[k.0].next_index();
    }
    Ok(out)
}

/// Release a chain: zero each block's data region, rewrite its node to
/// `(-1, -1)` on disk, and mirror both in memory. Idempotent on the empty
/// chain. The caller syncs.
pub fn release_chain(
    image: &DiskImage,
    nodes: &mut [ChainNode; MAX_BLOCKS],
    free: &mut FreeList,
    first: Option<BlockIndex>,
) -> Result<()> {
    let mut cur = first;
    let mut steps = 0_usize;
    while let Some(k) = cur {
        if !k.in_range() {
            return Err(CfsError::Corrupt(format!(
                "chain references block {k} outside the data region"
            )));
        }
        steps += 1;
        if steps > MAX_BLOCKS {
            return Err(CfsError::Corrupt(format!("chain cycles at block {k}")));
        }
        let next = nodes[k.0].next_index();
        image.write_zeros_at(k.data_offset(), BLOCK_SIZE)?;
        image.write_all_at(k.node_offset(), &encode_node(ChainNode::FREE))?;
        nodes[k.0] = ChainNode::FREE;
        free.mark_free(k);
        trace!(target: "cfs::fs::chain", event = "release_block", block = k.0);
        cur = next;
    }
    Ok(())
}

/// Install a chain over `blocks` (from the allocator, ascending) carrying
/// `content`: link and persist each node, then write each content slice.
/// The caller updates and persists the inode, then syncs.
pub fn install_chain(
    image: &DiskImage,
    nodes: &mut [ChainNode; MAX_BLOCKS],
    free: &mut FreeList,
    blocks: &[BlockIndex],
    content: &[u8],
) -> Result<()> {
    for (i, &k) in blocks.iter().enumerate() {
        let next = blocks.get(i + 1).copied();
        free.mark_used(k);
        nodes[k.0] = ChainNode::linked(k, next);
        image.write_all_at(k.node_offset(), &encode_node(nodes[k.0]))?;

        let start = i * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(content.len());
        image.write_all_at(k.data_offset(), &content[start..end])?;
        trace!(
            target: "cfs::fs::chain",
            event = "install_block",
            block = k.0,
            bytes = end - start
        );
    }
    Ok(())
}
