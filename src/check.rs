//! Diagnostic surface: tree dumps and structural validation.
//!
//! Everything here uses read-only block access; nothing on the mutation
//! path depends on it.

use std::io;
use std::io::Write;

use itertools::Itertools;

use crate::index::{insane, Index, Insane, WalkError};
use crate::node::{Node, NodeKind};
use crate::store::{BlockId, BlockStorage};

/// Output format for [`Index::display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// One line per node, indented by depth.
    Depth,
    /// Graphviz digraph.
    Dot,
    /// Sorted `(key,value)` listing, leaves only.
    Sorted,
}

/// Errors from [`Index::display`].
#[derive(Debug)]
pub enum DisplayError {
    IoError(io::Error),
    Insane(Insane),
}

impl std::fmt::Display for DisplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisplayError::IoError(err) => write!(f, "IO error: {}", err),
            DisplayError::Insane(insane) => write!(f, "corrupt index: {}", insane),
        }
    }
}

impl std::error::Error for DisplayError {}

impl From<io::Error> for DisplayError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<Insane> for DisplayError {
    fn from(insane: Insane) -> Self {
        Self::Insane(insane)
    }
}

impl From<WalkError> for DisplayError {
    fn from(err: WalkError) -> Self {
        match err {
            WalkError::Io(err) => Self::IoError(err),
            WalkError::Insane(insane) => Self::Insane(insane),
        }
    }
}

/// Errors from [`Index::sanity_check`] and [`Index::stats`].
#[derive(Debug)]
pub enum CheckError {
    IoError(io::Error),
    Insane(Insane),
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::IoError(err) => write!(f, "IO error: {}", err),
            CheckError::Insane(insane) => write!(f, "corrupt index: {}", insane),
        }
    }
}

impl std::error::Error for CheckError {}

impl From<io::Error> for CheckError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<Insane> for CheckError {
    fn from(insane: Insane) -> Self {
        Self::Insane(insane)
    }
}

impl From<WalkError> for CheckError {
    fn from(err: WalkError) -> Self {
        match err {
            WalkError::Io(err) => Self::IoError(err),
            WalkError::Insane(insane) => Self::Insane(insane),
        }
    }
}

/// Tree shape condensed into counts, from one level-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from the root down to the leaves, inclusive.
    pub height: u32,
    /// Interior-shaped nodes, the root included.
    pub interior_nodes: u32,
    pub leaf_nodes: u32,
    /// Key/value pairs stored across all leaves.
    pub entries: u64,
    /// Blocks on the freelist.
    pub free_blocks: u32,
}

/// Keys and values print as text when they are printable ASCII, as hex
/// otherwise.
fn render(bytes: &[u8]) -> String {
    if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic()) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("0x{}", hex::encode(bytes))
    }
}

fn interior_label(node: &Node, block: BlockId) -> Result<String, WalkError> {
    let mut label = String::new();
    for slot in 0..=node.num_keys() {
        if slot > 0 {
            label.push(' ');
        }
        let ptr = node.ptr(slot).map_err(|error| insane(block, error))?;
        label.push_str(&format!("*{}", ptr));
        if slot < node.num_keys() {
            label.push(' ');
            label.push_str(&render(node.key(slot).map_err(|error| insane(block, error))?));
        }
    }
    Ok(label)
}

fn leaf_label(node: &Node, block: BlockId) -> Result<String, WalkError> {
    let mut label = String::new();
    for slot in 0..node.num_keys() {
        if slot > 0 {
            label.push(' ');
        }
        let key = node.key(slot).map_err(|error| insane(block, error))?;
        let value = node.value(slot).map_err(|error| insane(block, error))?;
        label.push_str(&format!("({},{})", render(key), render(value)));
    }
    Ok(label)
}

fn check_sorted(node: &Node, block: BlockId) -> Result<(), WalkError> {
    let keys: Vec<&[u8]> = (0..node.num_keys())
        .map(|slot| node.key(slot))
        .collect::<Result<_, _>>()
        .map_err(|error| insane(block, error))?;
    if !keys.iter().tuple_windows().all(|(a, b)| a < b) {
        return Err(Insane::UnsortedKeys { block }.into());
    }
    Ok(())
}

impl<S: BlockStorage> Index<S> {
    /// Dump the tree depth-first into `out`.
    pub fn display(&mut self, out: &mut dyn Write, mode: DisplayMode) -> Result<(), DisplayError> {
        let sb = self.sb()?;
        if mode == DisplayMode::Dot {
            writeln!(out, "digraph tree {{")?;
        }
        self.display_node(sb.root, 0, out, mode)?;
        if mode == DisplayMode::Dot {
            writeln!(out, "}}")?;
        }
        Ok(())
    }

    fn display_node(
        &mut self,
        block: BlockId,
        depth: u32,
        out: &mut dyn Write,
        mode: DisplayMode,
    ) -> Result<(), DisplayError> {
        if depth > self.store().num_blocks() {
            return Err(Insane::Cycle { block }.into());
        }
        let node = self.load(block)?;
        match node.kind() {
            NodeKind::Root | NodeKind::Interior => {
                let label = interior_label(&node, block)?;
                match mode {
                    DisplayMode::Depth => {
                        let indent = depth as usize * 2;
                        writeln!(out, "{:indent$}{}: interior: {}", "", block, label)?;
                    }
                    DisplayMode::Dot => {
                        writeln!(out, "{} [ label=\"{}: {}\" ];", block, block, label)?;
                    }
                    DisplayMode::Sorted => {}
                }
                for slot in 0..=node.num_keys() {
                    let child = node.ptr(slot).map_err(|error| insane(block, error))?;
                    if child == 0 {
                        return Err(Insane::NullChild { block }.into());
                    }
                    if mode == DisplayMode::Dot {
                        writeln!(out, "{} -> {};", block, child)?;
                    }
                    self.display_node(child, depth + 1, out, mode)?;
                }
                Ok(())
            }
            NodeKind::Leaf => {
                let label = leaf_label(&node, block)?;
                match mode {
                    DisplayMode::Depth => {
                        let indent = depth as usize * 2;
                        writeln!(out, "{:indent$}{}: leaf: {}", "", block, label)?;
                    }
                    DisplayMode::Dot => {
                        writeln!(out, "{} [ label=\"{}: {}\" ];", block, block, label)?;
                    }
                    DisplayMode::Sorted => {
                        for slot in 0..node.num_keys() {
                            let key = node.key(slot).map_err(|error| insane(block, error))?;
                            let value = node.value(slot).map_err(|error| insane(block, error))?;
                            writeln!(out, "({},{})", render(key), render(value))?;
                        }
                    }
                }
                Ok(())
            }
            kind => Err(Insane::UnexpectedKind { block, kind }.into()),
        }
    }

    /// Breadth-first structural validation: uniform node kind per level
    /// (hence equal leaf depth), strictly ascending keys in every node,
    /// half-full lower bounds for non-root nodes, and non-descending values
    /// across the leaves in left-to-right order. Stops at the first
    /// violation. A root without keys is a fresh tree and trivially sane.
    pub fn sanity_check(&mut self) -> Result<(), CheckError> {
        let sb = self.sb()?;
        let root = self.load(sb.root)?;
        if root.kind() != NodeKind::Root {
            return Err(Insane::UnexpectedKind {
                block: sb.root,
                kind: root.kind(),
            }
            .into());
        }
        check_sorted(&root, sb.root)?;
        if root.num_keys() == 0 {
            return Ok(());
        }

        let mut level: Vec<BlockId> = Vec::new();
        for slot in 0..=root.num_keys() {
            level.push(root.ptr(slot).map_err(|error| insane(sb.root, error))?);
        }

        let mut depth = 1;
        let mut visited = 1u64;
        let mut last_value: Option<Vec<u8>> = None;
        while !level.is_empty() {
            let mut next = Vec::new();
            let mut level_kind: Option<NodeKind> = None;
            for &block in &level {
                if block == 0 {
                    return Err(Insane::NullChild { block }.into());
                }
                visited += 1;
                if visited > self.store().num_blocks() as u64 {
                    return Err(Insane::Cycle { block }.into());
                }
                let node = self.load(block)?;
                match level_kind {
                    None => level_kind = Some(node.kind()),
                    Some(kind) if kind != node.kind() => {
                        return Err(Insane::MixedLevel { depth }.into())
                    }
                    Some(_) => {}
                }
                check_sorted(&node, block)?;
                match node.kind() {
                    NodeKind::Interior => {
                        let min = node.interior_capacity() / 2;
                        if node.num_keys() < min {
                            return Err(Insane::UnderfullInterior {
                                block,
                                keys: node.num_keys(),
                                min,
                            }
                            .into());
                        }
                        for slot in 0..=node.num_keys() {
                            next.push(node.ptr(slot).map_err(|error| insane(block, error))?);
                        }
                    }
                    NodeKind::Leaf => {
                        let min = (node.leaf_capacity() + 1) / 2;
                        if node.num_keys() < min {
                            return Err(Insane::UnderfullLeaf {
                                block,
                                keys: node.num_keys(),
                                min,
                            }
                            .into());
                        }
                        for slot in 0..node.num_keys() {
                            let value = node.value(slot).map_err(|error| insane(block, error))?;
                            if let Some(last) = &last_value {
                                if value < last.as_slice() {
                                    return Err(Insane::UnsortedValues { block }.into());
                                }
                            }
                            last_value = Some(value.to_vec());
                        }
                    }
                    kind => return Err(Insane::UnexpectedKind { block, kind }.into()),
                }
            }
            level = next;
            depth += 1;
        }
        Ok(())
    }

    /// Count nodes, entries and free blocks in one level-order walk plus one
    /// freelist walk.
    pub fn stats(&mut self) -> Result<TreeStats, CheckError> {
        let sb = self.sb()?;
        let mut stats = TreeStats {
            height: 0,
            interior_nodes: 0,
            leaf_nodes: 0,
            entries: 0,
            free_blocks: 0,
        };

        let mut level = vec![sb.root];
        let mut visited = 0u64;
        while !level.is_empty() {
            stats.height += 1;
            let mut next = Vec::new();
            for &block in &level {
                visited += 1;
                if visited > self.store().num_blocks() as u64 {
                    return Err(Insane::Cycle { block }.into());
                }
                let node = self.load(block)?;
                match node.kind() {
                    NodeKind::Root | NodeKind::Interior => {
                        stats.interior_nodes += 1;
                        for slot in 0..=node.num_keys() {
                            let child = node.ptr(slot).map_err(|error| insane(block, error))?;
                            if child == 0 {
                                return Err(Insane::NullChild { block }.into());
                            }
                            next.push(child);
                        }
                    }
                    NodeKind::Leaf => {
                        stats.leaf_nodes += 1;
                        stats.entries += node.num_keys() as u64;
                    }
                    kind => return Err(Insane::UnexpectedKind { block, kind }.into()),
                }
            }
            level = next;
        }

        let mut cursor = sb.free_head;
        let mut walked = 0u64;
        while cursor != 0 {
            walked += 1;
            if walked > self.store().num_blocks() as u64 {
                return Err(Insane::Cycle { block: cursor }.into());
            }
            let node = self.load(cursor)?;
            if node.kind() != NodeKind::Unallocated {
                return Err(Insane::UnexpectedKind {
                    block: cursor,
                    kind: node.kind(),
                }
                .into());
            }
            stats.free_blocks += 1;
            cursor = node.free_next();
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn attached() -> Index<MemoryStore> {
        let mut index = Index::new(4, 4, MemoryStore::new(52, 16));
        index.attach(0, true).unwrap();
        index
    }

    #[test]
    fn fresh_tree_is_sane() {
        let mut index = attached();
        index.sanity_check().unwrap();
        assert_eq!(
            index.stats().unwrap(),
            TreeStats {
                height: 2,
                interior_nodes: 1,
                leaf_nodes: 1,
                entries: 0,
                free_blocks: 13,
            }
        );
    }

    #[test]
    fn depth_display_of_fresh_tree() {
        let mut index = attached();
        index.insert(b"bbbb", b"0001").unwrap();
        let mut out = Vec::new();
        index.display(&mut out, DisplayMode::Depth).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "1: interior: *2\n  2: leaf: (bbbb,0001)\n");
    }

    #[test]
    fn dot_display_is_a_digraph() {
        let mut index = attached();
        index.insert(b"bbbb", b"0001").unwrap();
        let mut out = Vec::new();
        index.display(&mut out, DisplayMode::Dot).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph tree {\n"));
        assert!(text.ends_with("}\n"));
        assert!(text.contains("1 [ label=\"1: *2\" ];"));
        assert!(text.contains("2 [ label=\"2: (bbbb,0001)\" ];"));
    }

    #[test]
    fn unprintable_bytes_render_as_hex() {
        assert_eq!(render(b"abcd"), "abcd");
        assert_eq!(render(&[0x00, 0xFF]), "0x00ff");
    }

    #[test]
    fn sanity_reports_descending_values() {
        let mut index = attached();
        for (key, value) in [
            (b"aaaa", b"AAAA"),
            (b"bbbb", b"BBBB"),
            (b"cccc", b"CCCC"),
            (b"dddd", b"DDDD"),
        ] {
            index.insert(key, value).unwrap();
        }
        index.sanity_check().unwrap();

        // Rewriting a value out of order trips the leaf value scan.
        index.update(b"aaaa", b"ZZZZ").unwrap();
        assert!(matches!(
            index.sanity_check(),
            Err(CheckError::Insane(Insane::UnsortedValues { .. }))
        ));
    }
}
