//! Arena-backed trie of path components

use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::fmt::Write as _;

/// Index of a node inside a [`NameTrie`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A single path component and the components listed beneath it
#[derive(Debug, Clone)]
pub struct TrieNode {
    /// Component name (`/` for the root)
    pub name: OsString,
    /// Children in first-insertion order; empty for a leaf
    pub children: Vec<NodeId>,
}

/// Tree of names built from the input list
///
/// All nodes live in one arena; parents own their children by index and
/// there are no back-pointers.
#[derive(Debug, Clone)]
pub struct NameTrie {
    nodes: Vec<TrieNode>,
    /// The overlay root itself appeared in the list
    root_listed: bool,
}

impl NameTrie {
    /// Root node id
    pub const ROOT: NodeId = NodeId(0);

    /// Create a trie holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode {
                name: OsString::from("/"),
                children: Vec::new(),
            }],
            root_listed: false,
        }
    }

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id.0]
    }

    /// Component name of a node
    pub fn name(&self, id: NodeId) -> &OsStr {
        &self.nodes[id.0].name
    }

    /// Children of a node, in insertion order
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Whether the node has no trie children
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    /// Whether enumeration at this node falls through to the real filesystem
    ///
    /// Every leaf passes through except an unlisted root, which stays an
    /// empty synthetic directory.
    pub fn is_passthrough(&self, id: NodeId) -> bool {
        self.is_leaf(id) && (id != Self::ROOT || self.root_listed)
    }

    /// Whether the overlay root itself was listed
    pub fn root_listed(&self) -> bool {
        self.root_listed
    }

    /// Find a child by exact name
    pub fn child(&self, id: NodeId, name: &OsStr) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child.0].name == name)
    }

    /// Insert a path given as components, returning the final node
    ///
    /// Existing components are reused, so inserting a path twice or
    /// inserting a prefix of a known path adds nothing. An empty path
    /// marks the root as listed.
    pub fn insert<I, S>(&mut self, components: I) -> Result<NodeId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut current = Self::ROOT;
        let mut depth = 0usize;

        for component in components {
            let component = component.as_ref();
            if component.is_empty() {
                continue;
            }
            depth += 1;

            current = match self.child(current, component) {
                Some(existing) => existing,
                None => self.push_child(current, component)?,
            };
        }

        if depth == 0 {
            self.root_listed = true;
        }

        Ok(current)
    }

    fn push_child(&mut self, parent: NodeId, name: &OsStr) -> Result<NodeId> {
        self.nodes.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        self.nodes[parent.0]
            .children
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;

        let id = NodeId(self.nodes.len());
        self.nodes.push(TrieNode {
            name: name.to_os_string(),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Total number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Depth of the deepest node (root is depth 0)
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(Self::ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max = max.max(depth);
            for &child in self.children(id) {
                stack.push((child, depth + 1));
            }
        }
        max
    }

    /// Indented listing of the tree; leaves that pass through are marked `*`
    pub fn render(&self) -> String {
        let mut out = String::from("/\n");
        self.render_into(Self::ROOT, 1, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, indent: usize, out: &mut String) {
        for &child in self.children(id) {
            let marker = if self.is_passthrough(child) { "*" } else { "/" };
            let _ = writeln!(
                out,
                "{:width$}{}{}",
                "",
                self.name(child).to_string_lossy(),
                marker,
                width = indent * 2
            );
            self.render_into(child, indent + 1, out);
        }
    }
}

impl Default for NameTrie {
    fn default() -> Self {
        Self::new()
    }
}
