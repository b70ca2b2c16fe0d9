use cfs_core::{FreeList, InodeEntry, decode_inode, encode_inode};
use cfs_types::BlockIndex;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_codec(c: &mut Criterion) {
    let entry = InodeEntry {
        name: "datafile.db".to_owned(),
        size: 1280,
        first_block: Some(BlockIndex(0)),
    };
    let raw = encode_inode(Some(&entry));

    c.bench_function("encode_inode", |b| {
        b.iter(|| encode_inode(black_box(Some(&entry))));
    });
    c.bench_function("decode_inode", |b| {
        b.iter(|| decode_inode(black_box(&raw)).expect("decode"));
    });
}

fn bench_allocator(c: &mut Criterion) {
    let mut list = FreeList::all_free();
    for k in [0_usize, 2, 4, 6, 8] {
        list.mark_used(BlockIndex(k));
    }
    c.bench_function("find_free_interleaved", |b| {
        b.iter(|| list.find_free(black_box(5)));
    });
}

criterion_group!(benches, bench_codec, bench_allocator);
criterion_main!(benches);
