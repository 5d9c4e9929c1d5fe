//! Block storage: fixed-size, numbered, byte-addressable blocks.
//!
//! The index core only ever talks to a [`BlockStorage`]. Three
//! implementations are provided: [`MemoryStore`] (a flat in-memory array,
//! the test substrate), [`FileStore`] (a memory-mapped file) and
//! [`CachedStore`] (a bounded write-through block cache layered over any
//! other store).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use memmap2::{MmapOptions, MmapRaw};
use quick_cache::sync::Cache;

/// Index of a block within a store. 0 is reserved: it addresses the
/// superblock and doubles as the "no such block" pointer on disk.
pub type BlockId = u32;

/// Fixed-size numbered block storage consumed by the index.
///
/// Reads take `&mut self` so that caching implementations can update their
/// state on the read path; the index is single-threaded throughout.
pub trait BlockStorage {
    /// Size of every block in bytes.
    fn block_size(&self) -> usize;

    /// Number of blocks the store holds.
    fn num_blocks(&self) -> u32;

    /// Read block `index` into `buf`. `buf` must be exactly one block long.
    fn read_block(&mut self, index: BlockId, buf: &mut [u8]) -> io::Result<()>;

    /// Write `buf` as block `index`. `buf` must be exactly one block long.
    fn write_block(&mut self, index: BlockId, buf: &[u8]) -> io::Result<()>;

    /// Advisory: block `index` has been taken off the freelist.
    fn notify_allocate(&mut self, _index: BlockId) {}

    /// Advisory: block `index` has been returned to the freelist.
    fn notify_deallocate(&mut self, _index: BlockId) {}
}

fn out_of_range(index: BlockId, num_blocks: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("block {} out of range (store holds {})", index, num_blocks),
    )
}

fn bad_length(len: usize, block_size: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("buffer is {} bytes, block size is {}", len, block_size),
    )
}

/// An in-memory block array.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    block_size: usize,
    data: Vec<u8>,
}

impl MemoryStore {
    /// A zero-filled store of `num_blocks` blocks of `block_size` bytes.
    pub fn new(block_size: usize, num_blocks: u32) -> Self {
        Self {
            block_size,
            data: vec![0; block_size * num_blocks as usize],
        }
    }

    fn range(&self, index: BlockId) -> io::Result<std::ops::Range<usize>> {
        if index >= self.num_blocks() {
            return Err(out_of_range(index, self.num_blocks()));
        }
        let start = index as usize * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl BlockStorage for MemoryStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u32 {
        (self.data.len() / self.block_size) as u32
    }

    fn read_block(&mut self, index: BlockId, buf: &mut [u8]) -> io::Result<()> {
        if buf.len() != self.block_size {
            return Err(bad_length(buf.len(), self.block_size));
        }
        let range = self.range(index)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_block(&mut self, index: BlockId, buf: &[u8]) -> io::Result<()> {
        if buf.len() != self.block_size {
            return Err(bad_length(buf.len(), self.block_size));
        }
        let range = self.range(index)?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

/// Errors from opening or creating a [`FileStore`].
#[derive(Debug)]
pub enum OpenError {
    IoError(io::Error),
    /// The file length is not a multiple of the block size.
    Misaligned { len: u64, block_size: usize },
    /// The file holds more blocks than a block pointer can address.
    TooManyBlocks { blocks: u64 },
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenError::IoError(err) => write!(f, "IO error: {}", err),
            OpenError::Misaligned { len, block_size } => write!(
                f,
                "file length {} is not a multiple of the block size {}",
                len, block_size
            ),
            OpenError::TooManyBlocks { blocks } => {
                write!(f, "file holds {} blocks, more than addressable", blocks)
            }
        }
    }
}

impl std::error::Error for OpenError {}

impl From<io::Error> for OpenError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

/// A block store over a memory-mapped file.
pub struct FileStore {
    _file: File,
    map: MmapRaw,
    block_size: usize,
    num_blocks: u32,
}

impl FileStore {
    /// Create (or truncate) the file at `path` sized to hold exactly
    /// `num_blocks` zeroed blocks.
    pub fn create(path: &Path, block_size: usize, num_blocks: u32) -> Result<Self, OpenError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(block_size as u64 * num_blocks as u64)?;
        let map = MmapOptions::new().map_raw(&file)?;
        Ok(Self {
            _file: file,
            map,
            block_size,
            num_blocks,
        })
    }

    /// Open an existing store, recovering the block count from the file
    /// length.
    pub fn open(path: &Path, block_size: usize) -> Result<Self, OpenError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % block_size as u64 != 0 {
            return Err(OpenError::Misaligned { len, block_size });
        }
        let blocks = len / block_size as u64;
        let num_blocks = u32::try_from(blocks).map_err(|_| OpenError::TooManyBlocks { blocks })?;
        let map = MmapOptions::new().map_raw(&file)?;
        Ok(Self {
            _file: file,
            map,
            block_size,
            num_blocks,
        })
    }

    /// Flush all written blocks to disk.
    pub fn sync(&self) -> io::Result<()> {
        self.map.flush()
    }

    fn offset(&self, index: BlockId) -> io::Result<usize> {
        if index >= self.num_blocks {
            return Err(out_of_range(index, self.num_blocks));
        }
        Ok(index as usize * self.block_size)
    }
}

impl BlockStorage for FileStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read_block(&mut self, index: BlockId, buf: &mut [u8]) -> io::Result<()> {
        if buf.len() != self.block_size {
            return Err(bad_length(buf.len(), self.block_size));
        }
        let offset = self.offset(index)?;
        unsafe {
            ptr::copy_nonoverlapping(self.map.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write_block(&mut self, index: BlockId, buf: &[u8]) -> io::Result<()> {
        if buf.len() != self.block_size {
            return Err(bad_length(buf.len(), self.block_size));
        }
        let offset = self.offset(index)?;
        unsafe {
            ptr::copy_nonoverlapping(buf.as_ptr(), self.map.as_mut_ptr().add(offset), buf.len());
        }
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.map.flush();
    }
}

/// A bounded write-through block cache over another store.
///
/// Reads are served from the cache when possible; writes go straight to the
/// backing store and refresh the cached copy. Deallocation notifications
/// drop the cached block.
pub struct CachedStore<S> {
    inner: S,
    cache: Cache<BlockId, Arc<[u8]>>,
}

impl<S: BlockStorage> CachedStore<S> {
    /// Wrap `inner` with a cache holding up to `capacity` blocks.
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }

    /// Unwrap the backing store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: BlockStorage> BlockStorage for CachedStore<S> {
    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn num_blocks(&self) -> u32 {
        self.inner.num_blocks()
    }

    fn read_block(&mut self, index: BlockId, buf: &mut [u8]) -> io::Result<()> {
        if let Some(block) = self.cache.get(&index) {
            if block.len() != buf.len() {
                return Err(bad_length(buf.len(), block.len()));
            }
            buf.copy_from_slice(&block);
            return Ok(());
        }
        self.inner.read_block(index, buf)?;
        self.cache.insert(index, Arc::from(&*buf));
        Ok(())
    }

    fn write_block(&mut self, index: BlockId, buf: &[u8]) -> io::Result<()> {
        self.inner.write_block(index, buf)?;
        self.cache.insert(index, Arc::from(buf));
        Ok(())
    }

    fn notify_allocate(&mut self, index: BlockId) {
        self.inner.notify_allocate(index);
    }

    fn notify_deallocate(&mut self, index: BlockId) {
        self.cache.remove(&index);
        self.inner.notify_deallocate(index);
    }
}
