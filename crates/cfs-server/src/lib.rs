#![forbid(unsafe_code)]
//! TCP command server for ChainFS.
//!
//! Clients speak a newline-terminated ASCII protocol: CREATE, WRITE, READ,
//! DELETE, LIST, QUIT. Each command gets exactly one reply line (READ replies
//! with the raw file bytes and a trailing newline). The `protocol` module
//! owns the grammar; `server` owns the listener, the worker pool, and the
//! per-connection loop.

mod protocol;
mod server;

pub use protocol::{Command, ProtocolError, parse};
pub use server::{DEFAULT_WORKERS, FileServer};
