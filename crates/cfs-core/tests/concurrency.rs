#![forbid(unsafe_code)]
//! Concurrent hammering of the facade from multiple worker threads.
//!
//! Workers draw names from a small shared pool and issue every operation
//! against them, so per-file locks, the global table lock, and the WRITE
//! re-verification path all see real contention. Afterwards the invariants
//! must hold and every surviving file must carry content some writer
//! actually wrote.

use cfs_core::FsManager;
use cfs_error::CfsError;
use cfs_types::{BLOCK_SIZE, IMAGE_LEN, MAX_BLOCKS};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const WORKERS: usize = 8;
const OPS_PER_WORKER: usize = 60;
const NAMES: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn payload(name: &str, worker: usize, op: usize) -> Vec<u8> {
    // Distinct per (name, worker, op) and between one and three blocks long.
    let tag = format!("{name}:{worker}:{op};");
    let len = BLOCK_SIZE + (worker * 31 + op * 17) % (2 * BLOCK_SIZE);
    tag.as_bytes().iter().copied().cycle().take(len).collect()
}

#[test]
fn concurrent_workers_preserve_invariants() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("disk.img");
    let fs = Arc::new(FsManager::open(&path, "testfs", IMAGE_LEN).expect("open"));

    // Everything any writer successfully stored, per name.
    let written: Arc<Mutex<HashMap<String, HashSet<Vec<u8>>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let fs = Arc::clone(&fs);
        let written = Arc::clone(&written);
        handles.push(thread::spawn(move || {
            for op in 0..OPS_PER_WORKER {
                let name = NAMES[(worker + op) % NAMES.len()];
                match (worker + op) % 5 {
                    0 => {
                        fs.create(name).expect("create is idempotent");
                    }
                    1 | 2 => {
                        let content = payload(name, worker, op);
                        // Record the payload before writing: a reader may
                        // observe it the instant the write commits.
                        written
                            .lock()
                            .entry(name.to_owned())
                            .or_default()
                            .insert(content.clone());
                        match fs.write(name, &content) {
                            Ok(()) => {}
                            Err(CfsError::NotFound(_) | CfsError::NoSpace) => {
                                written
                                    .lock()
                                    .get_mut(name)
                                    .expect("recorded above")
                                    .remove(&content);
                            }
                            Err(other) => panic!("unexpected write failure: {other}"),
                        }
                    }
                    3 => match fs.read(name) {
                        // Content is not asserted mid-run: a DELETE holds no
                        // per-file lock, so a read racing one may observe
                        // blocks already zeroed or reallocated. The quiescent
                        // checks below are the authoritative ones.
                        Ok(_) | Err(CfsError::NotFound(_)) => {}
                        Err(other) => panic!("unexpected read failure: {other}"),
                    },
                    _ => match fs.delete(name) {
                        Ok(()) | Err(CfsError::NotFound(_)) => {}
                        Err(other) => panic!("unexpected delete failure: {other}"),
                    },
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    fs.verify_invariants().expect("invariants after churn");
    assert!(fs.free_block_count() <= MAX_BLOCKS);

    // Surviving files still read back as something a writer stored.
    let written = written.lock();
    for name in fs.list() {
        let content = fs.read(&name).expect("read survivor");
        if !content.is_empty() {
            assert!(
                written
                    .get(&name)
                    .is_some_and(|set| set.contains(&content)),
                "file '{name}' holds bytes no writer stored"
            );
        }
    }

    // And the final state is exactly what a reload sees.
    let before = fs.snapshot();
    drop(fs);
    let reloaded = FsManager::open(&path, "testfs", IMAGE_LEN).expect("reopen");
    assert_eq!(reloaded.snapshot(), before);
    reloaded.verify_invariants().expect("invariants after reload");
}

#[test]
fn distinct_files_are_read_and_written_in_parallel() {
    let dir = TempDir::new().expect("tempdir");
    let fs = Arc::new(
        FsManager::open(dir.path().join("disk.img"), "testfs", IMAGE_LEN).expect("open"),
    );
    fs.create("left").expect("create");
    fs.create("right").expect("create");
    fs.write("left", b"left-initial").expect("seed");

    let reader = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || {
            for _ in 0..200 {
                let content = fs.read("left").expect("read");
                assert!(content == b"left-initial" || content == b"left-updated");
            }
        })
    };
    let writer = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || {
            for op in 0..200 {
                let content = payload("right", 0, op);
                fs.write("right", &content).expect("write");
            }
            fs.write("left", b"left-updated").expect("final write");
        })
    };
    reader.join().expect("reader panicked");
    writer.join().expect("writer panicked");

    assert_eq!(fs.read("left").expect("read"), b"left-updated");
    fs.verify_invariants().expect("invariants");
}
