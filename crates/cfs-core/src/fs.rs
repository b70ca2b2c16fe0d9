//! The file system manager facade.
//!
//! `FsManager` owns the backing image, the in-memory mirrors of both metadata
//! tables, and the lock hierarchy. Public operations are CREATE, WRITE, READ,
//! DELETE, and LIST; each acquires locks in the fixed order (per-file lock
//! before the global table lock), mutates memory and disk together, and syncs
//! before releasing its write lock.

use crate::alloc::FreeList;
use crate::chain;
use crate::codec::{ChainNode, InodeEntry, decode_inode, decode_node, encode_inode, encode_node};
use crate::inode::InodeTable;
use crate::locks::LockManager;
use cfs_block::DiskImage;
use cfs_error::{CfsError, Result};
use cfs_types::{
    BLOCK_SIZE, BlockIndex, CHAIN_NODE_SIZE, DATA_START, IMAGE_LEN, INODE_SIZE, MAX_BLOCKS,
    MAX_FILES, NAME_MAX, NO_BLOCK, SIZE_FIELD_MAX, blocks_needed,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

// ── Shared tables ───────────────────────────────────────────────────────────

/// The three in-memory mirrors, guarded together by the global lock.
#[derive(Debug)]
struct Tables {
    inodes: InodeTable,
    nodes: [ChainNode; MAX_BLOCKS],
    free: FreeList,
}

impl Tables {
    fn empty() -> Self {
        Self {
            inodes: InodeTable::default(),
            nodes: [ChainNode::FREE; MAX_BLOCKS],
            free: FreeList::all_free(),
        }
    }
}

// ── Facade ──────────────────────────────────────────────────────────────────

/// The file system manager.
///
/// Owns the simulated disk for its whole lifetime; dropping it flushes and
/// closes the backing file.
pub struct FsManager {
    image: DiskImage,
    /// The global lock `G`: guards the tables and (by protocol) the lock map.
    tables: RwLock<Tables>,
    locks: LockManager,
    fs_name: String,
}

impl FsManager {
    /// Open `path` as a ChainFS image, formatting it if absent or empty.
    ///
    /// `configured_size` is accepted for caller compatibility but the layout
    /// is fixed by the compile-time constants.
    pub fn open(path: impl AsRef<Path>, fs_name: &str, configured_size: u64) -> Result<Self> {
        let path = path.as_ref();
        let mut image = DiskImage::open(path)?;
        if configured_size != IMAGE_LEN {
            debug!(
                target: "cfs::fs",
                event = "configured_size_ignored",
                configured = configured_size,
                actual = IMAGE_LEN
            );
        }

        let tables = if image.is_empty() {
            format_image(&mut image)?
        } else {
            load_tables(&image)?
        };

        let locks = LockManager::new();
        for (_, entry) in tables.inodes.iter_occupied() {
            locks.create(&entry.name);
        }

        info!(
            target: "cfs::fs",
            event = "open",
            name = fs_name,
            path = %path.display(),
            files = locks.len(),
            free_blocks = tables.free.free_count(),
            data_start = DATA_START
        );
        Ok(Self {
            image,
            tables: RwLock::new(tables),
            locks,
            fs_name: fs_name.to_owned(),
        })
    }

    /// The name this file system was opened under.
    #[must_use]
    pub fn fs_name(&self) -> &str {
        &self.fs_name
    }

    /// Create an empty file. Creating an existing name succeeds silently.
    pub fn create(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if name.len() > NAME_MAX {
            return Err(CfsError::NameTooLong);
        }
        if tables.inodes.slot_of(name).is_some() {
            return Ok(());
        }
        let Some(slot) = tables.inodes.free_slot() else {
            return Err(CfsError::InodeTableFull);
        };

        let entry = InodeEntry::empty(name);
        self.image
            .write_all_at(slot.inode_offset(), &encode_inode(Some(&entry)))?;
        tables.inodes.set(slot, Some(entry));
        self.locks.create(name);
        self.image.sync()?;
        info!(target: "cfs::fs", event = "create", name, slot = slot.0);
        Ok(())
    }

    /// Replace the file's content with `content`.
    pub fn write(&self, name: &str, content: &[u8]) -> Result<()> {
        // The on-disk size field is a signed 16-bit integer.
        let size = match u16::try_from(content.len()) {
            Ok(s) if usize::from(s) <= SIZE_FIELD_MAX => s,
            _ => return Err(CfsError::NoSpace),
        };

        let file_lock = match self.locks.get(name) {
            Some(lock) => lock,
            None => {
                // Lazy creation, under the global write lock so it cannot
                // race CREATE or DELETE. A ghost name gets no lock entry.
                let tables = self.tables.write();
                if tables.inodes.slot_of(name).is_none() {
                    return Err(CfsError::NotFound(name.to_owned()));
                }
                self.locks.get_or_create(name)
            }
        };
        let _file_guard = file_lock.write();

        let needed = blocks_needed(content.len());
        {
            let tables = self.tables.read();
            if tables.inodes.slot_of(name).is_none() {
                return Err(CfsError::NotFound(name.to_owned()));
            }
            if tables.free.find_free(needed).is_none() {
                return Err(CfsError::NoSpace);
            }
        }

        let mut tables = self.tables.write();
        let tables = &mut *tables;
        // Re-verify: a DELETE may have slipped between the check above and
        // this critical section. Without this the write would resurrect the
        // file over released blocks.
        let Some(slot) = tables.inodes.slot_of(name) else {
            return Err(CfsError::NotFound(name.to_owned()));
        };
        // The allocation is also re-taken here: a pick made outside the
        // global lock could overlap another writer's. The old chain is still
        // allocated at this point, so a rewrite never reuses its own blocks.
        let Some(blocks) = tables.free.find_free(needed) else {
            return Err(CfsError::NoSpace);
        };

        let first = tables.inodes.entry(slot).and_then(|e| e.first_block);
        chain::release_chain(&self.image, &mut tables.nodes, &mut tables.free, first)?;
        chain::install_chain(&self.image, &mut tables.nodes, &mut tables.free, &blocks, content)?;

        if let Some(entry) = tables.inodes.entry_mut(slot) {
            entry.size = size;
            entry.first_block = blocks.first().copied();
            self.image
                .write_all_at(slot.inode_offset(), &encode_inode(Some(&*entry)))?;
        }
        self.image.sync()?;
        info!(
            target: "cfs::fs",
            event = "write",
            name,
            bytes = content.len(),
            blocks = blocks.len()
        );
        Ok(())
    }

    /// Read the file's whole content.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        // A lock entry exists for every live file, so an absent entry means
        // an absent file; looking up first keeps ghost names out of the map.
        let Some(file_lock) = self.locks.get(name) else {
            return Err(CfsError::NotFound(name.to_owned()));
        };
        let _file_guard = file_lock.read();

        let (size, blocks) = {
            let tables = self.tables.read();
            let Some((_, entry)) = tables.inodes.find(name) else {
                return Err(CfsError::NotFound(name.to_owned()));
            };
            let size = usize::from(entry.size);
            (size, chain::collect_chain(&tables.nodes, entry.first_block, size)?)
        };

        let mut data = vec![0_u8; size];
        let mut filled = 0_usize;
        for k in blocks {
            let n = (size - filled).min(BLOCK_SIZE);
            self.image
                .read_exact_at(k.data_offset(), &mut data[filled..filled + n])?;
            filled += n;
        }
        debug!(target: "cfs::fs", event = "read", name, bytes = size);
        Ok(data)
    }

    /// Delete the file, releasing its blocks.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let tables = &mut *tables;
        let Some(slot) = tables.inodes.slot_of(name) else {
            return Err(CfsError::NotFound(name.to_owned()));
        };

        let first = tables.inodes.entry(slot).and_then(|e| e.first_block);
        chain::release_chain(&self.image, &mut tables.nodes, &mut tables.free, first)?;
        tables.inodes.set(slot, None);
        self.image
            .write_all_at(slot.inode_offset(), &encode_inode(None))?;
        self.locks.remove(name);
        self.image.sync()?;
        info!(target: "cfs::fs", event = "delete", name, slot = slot.0);
        Ok(())
    }

    /// Names of all files, in slot order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.tables.read().inodes.names()
    }

    /// Number of free data blocks.
    #[must_use]
    pub fn free_block_count(&self) -> usize {
        self.tables.read().free.free_count()
    }

    /// Check invariants I1–I6 over the current tables.
    pub fn verify_invariants(&self) -> Result<()> {
        check_tables(&self.tables.read())
    }

    /// A frozen copy of the current tables.
    #[must_use]
    pub fn snapshot(&self) -> FsSnapshot {
        FsSnapshot::from_tables(&self.tables.read())
    }
}

// ── Initialisation and load ─────────────────────────────────────────────────

fn format_image(image: &mut DiskImage) -> Result<Tables> {
    image.set_len(IMAGE_LEN)?;
    image.write_zeros_at(0, MAX_FILES * INODE_SIZE)?;

    let mut region = [0_u8; MAX_BLOCKS * CHAIN_NODE_SIZE];
    for chunk in region.chunks_exact_mut(CHAIN_NODE_SIZE) {
        chunk.copy_from_slice(&encode_node(ChainNode::FREE));
    }
    image.write_all_at((MAX_FILES * INODE_SIZE) as u64, &region)?;
    image.sync()?;
    info!(target: "cfs::fs", event = "format", image_len = IMAGE_LEN);
    Ok(Tables::empty())
}

fn load_tables(image: &DiskImage) -> Result<Tables> {
    if image.len() != IMAGE_LEN {
        return Err(CfsError::Corrupt(format!(
            "image length {} does not match the fixed layout ({IMAGE_LEN} bytes)",
            image.len()
        )));
    }

    let mut inode_region = [0_u8; MAX_FILES * INODE_SIZE];
    image.read_exact_at(0, &mut inode_region)?;
    let mut slots: [Option<InodeEntry>; MAX_FILES] = Default::default();
    for (i, slot) in slots.iter_mut().enumerate() {
        let mut raw = [0_u8; INODE_SIZE];
        raw.copy_from_slice(&inode_region[i * INODE_SIZE..(i + 1) * INODE_SIZE]);
        *slot = decode_inode(&raw)?;
    }

    let mut node_region = [0_u8; MAX_BLOCKS * CHAIN_NODE_SIZE];
    image.read_exact_at((MAX_FILES * INODE_SIZE) as u64, &mut node_region)?;
    let mut nodes = [ChainNode::FREE; MAX_BLOCKS];
    for (i, node) in nodes.iter_mut().enumerate() {
        let mut raw = [0_u8; CHAIN_NODE_SIZE];
        raw.copy_from_slice(&node_region[i * CHAIN_NODE_SIZE..(i + 1) * CHAIN_NODE_SIZE]);
        *node = decode_node(&raw);
    }

    // Canonical free-list rule: free iff the node's own-index field is
    // negative.
    let mut flags = [false; MAX_BLOCKS];
    for (k, flag) in flags.iter_mut().enumerate() {
        *flag = nodes[k].is_free();
    }

    let tables = Tables {
        inodes: InodeTable::from_slots(slots),
        nodes,
        free: FreeList::from_flags(flags),
    };
    check_tables(&tables)?;
    Ok(tables)
}

fn check_tables(tables: &Tables) -> Result<()> {
    let mut referenced = [false; MAX_BLOCKS];
    for (slot, entry) in tables.inodes.iter_occupied() {
        for (other_slot, other) in tables.inodes.iter_occupied() {
            if other_slot.0 > slot.0 && other.name == entry.name {
                return Err(CfsError::Corrupt(format!(
                    "file name '{}' appears in slots {slot} and {other_slot}",
                    entry.name
                )));
            }
        }

        let size = usize::from(entry.size);
        if size > MAX_BLOCKS * BLOCK_SIZE {
            return Err(CfsError::Corrupt(format!(
                "file '{}' claims {size} bytes, beyond the data region",
                entry.name
            )));
        }

        let chain = chain::walk_chain(&tables.nodes, entry.first_block)?;
        if chain.len() != blocks_needed(size) {
            return Err(CfsError::Corrupt(format!(
                "file '{}' holds {} blocks for {size} bytes",
                entry.name,
                chain.len()
            )));
        }
        for k in chain {
            if referenced[k.0] {
                return Err(CfsError::Corrupt(format!(
                    "block {k} appears in two chains"
                )));
            }
            referenced[k.0] = true;
            if tables.nodes[k.0].block_index != k.to_disk() {
                return Err(CfsError::Corrupt(format!(
                    "chain node {k} does not reference its own block"
                )));
            }
        }
    }

    for (k, &was_referenced) in referenced.iter().enumerate() {
        let allocated = !tables.nodes[k].is_free();
        if tables.free.is_free(BlockIndex(k)) == allocated {
            return Err(CfsError::Corrupt(format!(
                "free list disagrees with the node table at block {k}"
            )));
        }
        if allocated && !was_referenced {
            return Err(CfsError::Corrupt(format!(
                "block {k} is allocated but belongs to no file"
            )));
        }
    }
    Ok(())
}

// ── Snapshots ───────────────────────────────────────────────────────────────

/// A frozen, serialisable copy of the metadata tables.
///
/// Two snapshots compare equal exactly when the tables they mirror are
/// bit-identical on disk, which is what the reload-equality tests and the
/// `inspect` report rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FsSnapshot {
    pub inodes: Vec<Option<InodeRecord>>,
    pub nodes: Vec<NodeRecord>,
    pub free: Vec<bool>,
}

/// One occupied inode slot, in on-disk terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InodeRecord {
    pub name: String,
    pub size: u16,
    pub first_block: i16,
}

/// One chain-node slot, in on-disk terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub block_index: i16,
    pub next: i16,
}

impl FsSnapshot {
    fn from_tables(tables: &Tables) -> Self {
        Self {
            inodes: tables
                .inodes
                .slots()
                .iter()
                .map(|slot| {
                    slot.as_ref().map(|e| InodeRecord {
                        name: e.name.clone(),
                        size: e.size,
                        first_block: e.first_block.map_or(NO_BLOCK, BlockIndex::to_disk),
                    })
                })
                .collect(),
            nodes: tables
                .nodes
                .iter()
                .map(|n| NodeRecord {
                    block_index: n.block_index,
                    next: n.next,
                })
                .collect(),
            free: tables.free.flags().to_vec(),
        }
    }

    /// The block indices of the file in `record`, following next links.
    /// Bounds-guarded so a corrupt snapshot cannot loop.
    #[must_use]
    pub fn chain_of(&self, record: &InodeRecord) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cur = record.first_block;
        while let Ok(k) = usize::try_from(cur) {
            if k >= self.nodes.len() || out.len() >= self.nodes.len() {
                break;
            }
            out.push(k);
            cur = self.nodes[k].next;
        }
        out
    }

    /// Number of occupied inode slots.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.inodes.iter().filter(|s| s.is_some()).count()
    }

    /// Number of free data blocks.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|&&f| f).count()
    }
}

/// Load a read-only snapshot of an image without taking ownership of it.
pub fn inspect_image(path: impl AsRef<Path>) -> Result<FsSnapshot> {
    let image = DiskImage::open_read_only(path)?;
    let tables = load_tables(&image)?;
    Ok(FsSnapshot::from_tables(&tables))
}
