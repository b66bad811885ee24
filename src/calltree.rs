//! Call-tree storage shared by both profiler variants.
//!
//! Nodes live in an arena owned by the [`CallTree`]. A parent refers to its
//! children by index and a child refers back to its parent by index, so the
//! back-reference never keeps a node alive: dropping or truncating the arena is
//! the only way nodes go away. The root sits at index 0 and is its own parent,
//! which turns an unbalanced `exit` into a harmless no-op on the cursor.

use std::collections::BTreeMap;

/// Index of a node inside its [`CallTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// Builds the region key for `name` with an optional qualifier.
pub fn region_key(name: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) => format!("{name} - {q}"),
        None => name.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct CallNode {
    time: u64,
    count: u64,
    parent: NodeId,
    children: BTreeMap<String, NodeId>,
}

impl CallNode {
    fn new(parent: NodeId) -> Self {
        Self {
            time: 0,
            count: 0,
            parent,
            children: BTreeMap::new(),
        }
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Children keyed by region key, in key order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(k, id)| (k.as_str(), *id))
    }

    pub fn child(&self, key: &str) -> Option<NodeId> {
        self.children.get(key).copied()
    }

    pub fn accumulate(&mut self, duration: u64) {
        self.time = self.time.saturating_add(duration);
        self.count = self.count.saturating_add(1);
    }
}

/// One call tree plus its cursor.
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallNode>,
    current: NodeId,
}

impl CallTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![CallNode::new(NodeId::ROOT)],
            current: NodeId::ROOT,
        }
    }

    pub fn root(&self) -> &CallNode {
        &self.nodes[NodeId::ROOT.0]
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn is_at_root(&self) -> bool {
        self.current == NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &CallNode {
        &self.nodes[id.0]
    }

    /// Number of nodes below the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of regions currently open on this tree's stream.
    pub fn open_depth(&self) -> usize {
        let mut depth = 0;
        let mut id = self.current;
        while id != NodeId::ROOT {
            depth += 1;
            id = self.nodes[id.0].parent;
        }
        depth
    }

    /// Follows `path` of region keys from the root.
    pub fn find(&self, path: &[&str]) -> Option<&CallNode> {
        let mut id = NodeId::ROOT;
        for key in path {
            id = self.nodes[id.0].child(key)?;
        }
        Some(&self.nodes[id.0])
    }

    pub fn find_or_create_child(&mut self, parent: NodeId, key: &str) -> NodeId {
        if let Some(id) = self.nodes[parent.0].child(key) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(CallNode::new(parent));
        self.nodes[parent.0].children.insert(key.to_string(), id);
        id
    }

    /// Opens the region `key` below the cursor.
    pub fn enter(&mut self, key: &str) {
        self.current = self.find_or_create_child(self.current, key);
    }

    /// Closes the open region, charging it `elapsed`.
    ///
    /// Returns `false` when the cursor was already at the root. The root still
    /// absorbs the charge and the cursor stays put.
    pub fn exit(&mut self, elapsed: u64) -> bool {
        let was_open = !self.is_at_root();
        let node = &mut self.nodes[self.current.0];
        node.accumulate(elapsed);
        self.current = node.parent;
        was_open
    }

    /// Drops every node below the root and zeroes the root.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        let root = &mut self.nodes[NodeId::ROOT.0];
        root.children.clear();
        root.time = 0;
        root.count = 0;
        self.current = NodeId::ROOT;
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}
