//! Block layout codec: the typed view over a raw block buffer.
//!
//! Every block carries the same little-endian header (see the crate docs for
//! the byte diagram); the payload region is interpreted per kind:
//!
//! * interior and root blocks interleave child pointers with separator keys,
//!   `P0 K0 P1 K1 … Kn-1 Pn` — one more pointer than keys;
//! * leaf blocks hold `(key, value)` pairs back to back, keys ascending;
//! * unallocated blocks only use the header's `free_next` field;
//! * the superblock reuses the `parent` slot for the root block and the
//!   `free_next` slot for the freelist head.
//!
//! A [`Node`] owns its block buffer and mutates it in place; writing a node
//! back to storage is just writing [`Node::as_bytes`]. All slot accessors
//! are bounds-checked against the node's kind and current key count.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::store::BlockId;

/// Size of the common block header in bytes.
pub const HEADER_SIZE: usize = core::mem::size_of::<NodeHeader>();

/// Size of a block pointer inside an interior payload, in bytes.
pub const PTR_SIZE: usize = 4;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy)]
#[repr(C)]
struct NodeHeader {
    kind: U32,
    num_keys: U32,
    key_size: U32,
    value_size: U32,
    block_size: U32,
    parent: U32,
    free_next: U32,
}

/// The role a block currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Superblock,
    Root,
    Interior,
    Leaf,
    Unallocated,
}

impl NodeKind {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(NodeKind::Superblock),
            2 => Some(NodeKind::Root),
            3 => Some(NodeKind::Interior),
            4 => Some(NodeKind::Leaf),
            5 => Some(NodeKind::Unallocated),
            _ => None,
        }
    }

    fn raw(self) -> u32 {
        match self {
            NodeKind::Superblock => 1,
            NodeKind::Root => 2,
            NodeKind::Interior => 3,
            NodeKind::Leaf => 4,
            NodeKind::Unallocated => 5,
        }
    }

    /// Interior-shaped kinds carry pointers and separator keys.
    pub fn is_interior(self) -> bool {
        matches!(self, NodeKind::Root | NodeKind::Interior)
    }
}

/// Errors from decoding a block or addressing its slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// The buffer is shorter than the block header.
    Truncated { len: usize },
    /// The kind discriminator is not a known node kind.
    UnknownKind { raw: u32 },
    /// The header's block size disagrees with the buffer length.
    BlockSizeMismatch { header: u32, buffer: usize },
    /// A slot index outside the valid range for the node's kind and key
    /// count.
    BadSlot { slot: u32, limit: u32 },
    /// A slot access that the node's kind does not support.
    WrongKind { kind: NodeKind },
    /// A key or value whose length does not match the configured size.
    LengthMismatch { expected: u32, got: usize },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::Truncated { len } => {
                write!(f, "block of {} bytes is shorter than the header", len)
            }
            LayoutError::UnknownKind { raw } => write!(f, "unknown node kind {}", raw),
            LayoutError::BlockSizeMismatch { header, buffer } => write!(
                f,
                "header says {} byte blocks but the buffer is {} bytes",
                header, buffer
            ),
            LayoutError::BadSlot { slot, limit } => {
                write!(f, "slot {} out of range (limit {})", slot, limit)
            }
            LayoutError::WrongKind { kind } => {
                write!(f, "slot access unsupported on a {:?} node", kind)
            }
            LayoutError::LengthMismatch { expected, got } => {
                write!(f, "expected {} bytes, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for LayoutError {}

/// A typed, mutable view over one block's bytes.
pub struct Node {
    kind: NodeKind,
    buf: Vec<u8>,
}

impl Node {
    /// A fresh zeroed node of the given kind and geometry.
    pub fn new(kind: NodeKind, key_size: u32, value_size: u32, block_size: u32) -> Self {
        debug_assert!(block_size as usize >= HEADER_SIZE);
        let mut node = Node {
            kind,
            buf: vec![0; block_size as usize],
        };
        let header = node.header_mut();
        header.kind = U32::new(kind.raw());
        header.key_size = U32::new(key_size);
        header.value_size = U32::new(value_size);
        header.block_size = U32::new(block_size);
        node
    }

    /// Interpret a block buffer, validating the header.
    pub fn decode(buf: Vec<u8>) -> Result<Self, LayoutError> {
        if buf.len() < HEADER_SIZE {
            return Err(LayoutError::Truncated { len: buf.len() });
        }
        let (header, _) = NodeHeader::ref_from_prefix(&buf).unwrap();
        let raw = header.kind.get();
        let block_size = header.block_size.get();
        let kind = NodeKind::from_raw(raw).ok_or(LayoutError::UnknownKind { raw })?;
        if block_size as usize != buf.len() {
            return Err(LayoutError::BlockSizeMismatch {
                header: block_size,
                buffer: buf.len(),
            });
        }
        Ok(Node { kind, buf })
    }

    /// The encoded block, ready to be written back.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn header(&self) -> &NodeHeader {
        NodeHeader::ref_from_prefix(&self.buf).unwrap().0
    }

    fn header_mut(&mut self) -> &mut NodeHeader {
        NodeHeader::mut_from_prefix(&mut self.buf).unwrap().0
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: NodeKind) {
        self.kind = kind;
        self.header_mut().kind = U32::new(kind.raw());
    }

    pub fn num_keys(&self) -> u32 {
        self.header().num_keys.get()
    }

    pub fn set_num_keys(&mut self, num_keys: u32) {
        self.header_mut().num_keys = U32::new(num_keys);
    }

    pub fn key_size(&self) -> u32 {
        self.header().key_size.get()
    }

    pub fn value_size(&self) -> u32 {
        self.header().value_size.get()
    }

    pub fn block_size(&self) -> u32 {
        self.header().block_size.get()
    }

    /// Parent block. Holds the root block in the superblock; advisory in
    /// live nodes.
    pub fn parent(&self) -> BlockId {
        self.header().parent.get()
    }

    pub fn set_parent(&mut self, parent: BlockId) {
        self.header_mut().parent = U32::new(parent);
    }

    /// Next block on the freelist. Holds the freelist head in the
    /// superblock; meaningless in live nodes, which are written with 0 here.
    pub fn free_next(&self) -> BlockId {
        self.header().free_next.get()
    }

    pub fn set_free_next(&mut self, next: BlockId) {
        self.header_mut().free_next = U32::new(next);
    }

    fn payload_len(&self) -> usize {
        (self.block_size() as usize).saturating_sub(HEADER_SIZE)
    }

    fn pair_size(&self) -> usize {
        (self.key_size() + self.value_size()) as usize
    }

    fn cell_size(&self) -> usize {
        PTR_SIZE + self.key_size() as usize
    }

    /// Maximum number of `(key, value)` pairs a leaf payload holds.
    pub fn leaf_capacity(&self) -> u32 {
        (self.payload_len() / self.pair_size()) as u32
    }

    /// Maximum number of separator keys an interior payload holds; there is
    /// always one more pointer than keys.
    pub fn interior_capacity(&self) -> u32 {
        (self.payload_len().saturating_sub(PTR_SIZE) / self.cell_size()) as u32
    }

    pub fn free_leaf_slots(&self) -> u32 {
        self.leaf_capacity().saturating_sub(self.num_keys())
    }

    pub fn free_interior_slots(&self) -> u32 {
        self.interior_capacity().saturating_sub(self.num_keys())
    }

    /// Byte offset of key slot `slot` within the block.
    pub(crate) fn resolve_key_offset(&self, slot: u32) -> usize {
        match self.kind {
            NodeKind::Leaf => HEADER_SIZE + slot as usize * self.pair_size(),
            _ => HEADER_SIZE + slot as usize * self.cell_size() + PTR_SIZE,
        }
    }

    /// Byte offset of pointer slot `slot` within an interior block.
    pub(crate) fn resolve_ptr_offset(&self, slot: u32) -> usize {
        HEADER_SIZE + slot as usize * self.cell_size()
    }

    fn resolve_value_offset(&self, slot: u32) -> usize {
        self.resolve_key_offset(slot) + self.key_size() as usize
    }

    fn check_key_slot(&self, slot: u32) -> Result<(), LayoutError> {
        if !self.kind.is_interior() && self.kind != NodeKind::Leaf {
            return Err(LayoutError::WrongKind { kind: self.kind });
        }
        if slot >= self.num_keys() {
            return Err(LayoutError::BadSlot {
                slot,
                limit: self.num_keys(),
            });
        }
        Ok(())
    }

    fn check_value_slot(&self, slot: u32) -> Result<(), LayoutError> {
        if self.kind != NodeKind::Leaf {
            return Err(LayoutError::WrongKind { kind: self.kind });
        }
        if slot >= self.num_keys() {
            return Err(LayoutError::BadSlot {
                slot,
                limit: self.num_keys(),
            });
        }
        Ok(())
    }

    fn check_ptr_slot(&self, slot: u32) -> Result<(), LayoutError> {
        if !self.kind.is_interior() {
            return Err(LayoutError::WrongKind { kind: self.kind });
        }
        if slot > self.num_keys() {
            return Err(LayoutError::BadSlot {
                slot,
                limit: self.num_keys() + 1,
            });
        }
        Ok(())
    }

    pub fn key(&self, slot: u32) -> Result<&[u8], LayoutError> {
        self.check_key_slot(slot)?;
        let offset = self.resolve_key_offset(slot);
        Ok(&self.buf[offset..offset + self.key_size() as usize])
    }

    pub fn set_key(&mut self, slot: u32, key: &[u8]) -> Result<(), LayoutError> {
        if key.len() != self.key_size() as usize {
            return Err(LayoutError::LengthMismatch {
                expected: self.key_size(),
                got: key.len(),
            });
        }
        self.check_key_slot(slot)?;
        let offset = self.resolve_key_offset(slot);
        self.buf[offset..offset + key.len()].copy_from_slice(key);
        Ok(())
    }

    pub fn value(&self, slot: u32) -> Result<&[u8], LayoutError> {
        self.check_value_slot(slot)?;
        let offset = self.resolve_value_offset(slot);
        Ok(&self.buf[offset..offset + self.value_size() as usize])
    }

    pub fn set_value(&mut self, slot: u32, value: &[u8]) -> Result<(), LayoutError> {
        if value.len() != self.value_size() as usize {
            return Err(LayoutError::LengthMismatch {
                expected: self.value_size(),
                got: value.len(),
            });
        }
        self.check_value_slot(slot)?;
        let offset = self.resolve_value_offset(slot);
        self.buf[offset..offset + value.len()].copy_from_slice(value);
        Ok(())
    }

    pub fn ptr(&self, slot: u32) -> Result<BlockId, LayoutError> {
        self.check_ptr_slot(slot)?;
        let offset = self.resolve_ptr_offset(slot);
        let raw = self.buf[offset..offset + PTR_SIZE].try_into().unwrap();
        Ok(u32::from_le_bytes(raw))
    }

    pub fn set_ptr(&mut self, slot: u32, ptr: BlockId) -> Result<(), LayoutError> {
        self.check_ptr_slot(slot)?;
        let offset = self.resolve_ptr_offset(slot);
        self.buf[offset..offset + PTR_SIZE].copy_from_slice(&ptr.to_le_bytes());
        Ok(())
    }

    /// The child pointer slot to descend through for `key`: the pointer
    /// immediately left of the first separator strictly greater than `key`,
    /// or the rightmost pointer. Equal keys route right, matching the split
    /// policy that keeps a promoted key as its right sibling's first entry.
    pub fn interior_child_slot(&self, key: &[u8]) -> Result<u32, LayoutError> {
        if !self.kind.is_interior() {
            return Err(LayoutError::WrongKind { kind: self.kind });
        }
        let num_keys = self.num_keys();
        for slot in 0..num_keys {
            if key < self.key(slot)? {
                return Ok(slot);
            }
        }
        Ok(num_keys)
    }

    /// Linear scan of a leaf: `Ok(slot)` of the first exact match, or
    /// `Err(slot)` naming the insertion point that keeps keys sorted.
    pub fn leaf_seek(&self, key: &[u8]) -> Result<Result<u32, u32>, LayoutError> {
        if self.kind != NodeKind::Leaf {
            return Err(LayoutError::WrongKind { kind: self.kind });
        }
        let num_keys = self.num_keys();
        for slot in 0..num_keys {
            let probe = self.key(slot)?;
            if probe == key {
                return Ok(Ok(slot));
            }
            if key < probe {
                return Ok(Err(slot));
            }
        }
        Ok(Err(num_keys))
    }

    /// Shift leaf pairs `[from, end)` one slot right. Raw byte motion; the
    /// caller adjusts `num_keys`.
    pub(crate) fn leaf_shift_right(&mut self, from: u32, end: u32) {
        if from >= end {
            return;
        }
        let start = self.resolve_key_offset(from);
        let stop = self.resolve_key_offset(end);
        let pair = self.pair_size();
        self.buf.copy_within(start..stop, start + pair);
    }

    /// Shift interior keys `[from, end)` and pointers `[from + 1, end + 1)`
    /// one cell right.
    pub(crate) fn interior_shift_right(&mut self, from: u32, end: u32) {
        if from >= end {
            return;
        }
        let start = self.resolve_key_offset(from);
        let stop = self.resolve_ptr_offset(end) + PTR_SIZE;
        let cell = self.cell_size();
        self.buf.copy_within(start..stop, start + cell);
    }

    /// Insert `(key, value)` at `slot`, shifting the tail right. The caller
    /// guarantees a free slot.
    pub(crate) fn leaf_insert_at(
        &mut self,
        slot: u32,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), LayoutError> {
        let num_keys = self.num_keys();
        self.leaf_shift_right(slot, num_keys);
        self.set_num_keys(num_keys + 1);
        self.set_key(slot, key)?;
        self.set_value(slot, value)?;
        Ok(())
    }

    /// Insert a `(separator, right child)` pair at key slot `slot`, shifting
    /// the tail right. The caller guarantees a free slot.
    pub(crate) fn interior_insert_at(
        &mut self,
        slot: u32,
        key: &[u8],
        right: BlockId,
    ) -> Result<(), LayoutError> {
        let num_keys = self.num_keys();
        self.interior_shift_right(slot, num_keys);
        self.set_num_keys(num_keys + 1);
        self.set_key(slot, key)?;
        self.set_ptr(slot + 1, right)?;
        Ok(())
    }

    /// Raw bytes of leaf pairs `[from, to)`.
    pub(crate) fn leaf_pairs_bytes(&self, from: u32, to: u32) -> &[u8] {
        &self.buf[self.resolve_key_offset(from)..self.resolve_key_offset(to)]
    }

    /// Write raw pair bytes starting at pair slot `at`.
    pub(crate) fn leaf_write_pairs(&mut self, at: u32, bytes: &[u8]) {
        let offset = self.resolve_key_offset(at);
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Raw bytes of the interior run from pointer `first` through pointer
    /// `last` inclusive, with the keys between them.
    pub(crate) fn interior_ptr_run(&self, first: u32, last: u32) -> &[u8] {
        &self.buf[self.resolve_ptr_offset(first)..self.resolve_ptr_offset(last) + PTR_SIZE]
    }

    /// Raw bytes of the interior run from key `first` through pointer `last`
    /// inclusive.
    pub(crate) fn interior_key_run(&self, first: u32, last: u32) -> &[u8] {
        &self.buf[self.resolve_key_offset(first)..self.resolve_ptr_offset(last) + PTR_SIZE]
    }

    /// Write raw interior bytes starting at pointer slot `at`.
    pub(crate) fn interior_write_at_ptr(&mut self, at: u32, bytes: &[u8]) {
        let offset = self.resolve_ptr_offset(at);
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Write raw interior bytes starting at key slot `at`.
    pub(crate) fn interior_write_at_key(&mut self, at: u32, bytes: &[u8]) {
        let offset = self.resolve_key_offset(at);
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("num_keys", &self.num_keys())
            .field("block_size", &self.block_size())
            .finish()
    }
}
