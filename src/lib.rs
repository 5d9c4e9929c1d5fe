#![doc = include_str!("../README.md")]

pub mod check;
pub mod index;
pub mod node;
pub mod store;

pub use check::{CheckError, DisplayError, DisplayMode, TreeStats};
pub use index::{AttachError, DetachError, Index, Insane, InsertError, LookupError, UpdateError};
pub use node::{LayoutError, Node, NodeKind};
pub use store::{BlockId, BlockStorage, CachedStore, FileStore, MemoryStore, OpenError};
