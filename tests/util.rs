#![allow(dead_code)]

use blocktree::{BlockStorage, DisplayMode, Index, MemoryStore};

/// Small-tree geometry: 4-byte keys and values, 52-byte blocks, so a leaf
/// holds three pairs and an interior node two separators.
pub const BLOCK_SIZE: usize = 52;
pub const NUM_BLOCKS: u32 = 16;

pub fn small_index() -> Index<MemoryStore> {
    let mut index = Index::new(4, 4, MemoryStore::new(BLOCK_SIZE, NUM_BLOCKS));
    index.attach(0, true).unwrap();
    index
}

pub fn insert_all(index: &mut Index<MemoryStore>, pairs: &[(&[u8], &[u8])]) {
    for (key, value) in pairs {
        index.insert(key, value).unwrap();
    }
}

pub fn depth_listing<S: BlockStorage>(index: &mut Index<S>) -> String {
    let mut out = Vec::new();
    index.display(&mut out, DisplayMode::Depth).unwrap();
    String::from_utf8(out).unwrap()
}

pub fn sorted_listing<S: BlockStorage>(index: &mut Index<S>) -> String {
    let mut out = Vec::new();
    index.display(&mut out, DisplayMode::Sorted).unwrap();
    String::from_utf8(out).unwrap()
}
