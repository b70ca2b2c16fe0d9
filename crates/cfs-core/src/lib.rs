#![forbid(unsafe_code)]
//! The ChainFS on-disk file system manager.
//!
//! One backing file simulates a disk: a 115-byte metadata region (five
//! 15-byte inode slots, ten 4-byte chain nodes) rounded up to one block,
//! followed by ten 128-byte data blocks. A file's content is a linked chain
//! of blocks; the inode names the head and each chain node its successor.
//!
//! Layers, bottom up:
//!
//! 1. `codec` — bit-exact record encode/decode (big-endian i16 fields).
//! 2. `alloc` — linear-scan free-block accounting.
//! 3. `inode` — the fixed five-slot inode table.
//! 4. `chain` — chain walk, release, and install over the disk image.
//! 5. `locks` — per-file read/write locks.
//! 6. `fs` — the `FsManager` facade: CREATE / WRITE / READ / DELETE / LIST
//!    under a global table lock plus per-file locks, with write-through
//!    durability (every mutation persists and syncs before its lock drops).

mod alloc;
mod chain;
mod codec;
mod fs;
mod inode;
mod locks;

pub use alloc::FreeList;
pub use codec::{ChainNode, InodeEntry, decode_inode, decode_node, encode_inode, encode_node};
pub use fs::{FsManager, FsSnapshot, InodeRecord, NodeRecord, inspect_image};
pub use inode::InodeTable;
pub use locks::{FileLock, LockManager};
