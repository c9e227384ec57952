//! Graph storage for HNSW layers.

use std::collections::HashMap;

/// Internal node id, dense for slot indexing. Slots are never reused, so
/// a `NodeId` stays valid for the life of the index.
pub type NodeId = u32;

/// Neighbor list for a node at one layer.
#[derive(Debug, Clone, Default)]
pub struct Neighbors {
    ids: Vec<NodeId>,
}

impl Neighbors {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Add a neighbor. Returns `false` if already present.
    pub fn add(&mut self, id: NodeId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove a neighbor. Returns `false` if not found.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<NodeId> for Neighbors {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Adjacency for a single HNSW layer.
///
/// Mutation happens under the owning library's write lock, so this is a
/// plain map without interior locking.
#[derive(Debug, Default)]
pub struct LayerGraph {
    adjacency: HashMap<NodeId, Neighbors>,
}

impl LayerGraph {
    pub fn new() -> Self {
        Self {
            adjacency: HashMap::new(),
        }
    }

    /// Register a node with an empty neighbor list if absent.
    pub fn ensure_node(&mut self, node: NodeId) {
        self.adjacency.entry(node).or_default();
    }

    pub fn neighbors(&self, node: NodeId) -> Option<&Neighbors> {
        self.adjacency.get(&node)
    }

    /// Replace a node's neighbor list.
    pub fn set_neighbors(&mut self, node: NodeId, neighbors: Neighbors) {
        self.adjacency.insert(node, neighbors);
    }

    /// Add a bidirectional edge.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.adjacency.entry(from).or_default().add(to);
        self.adjacency.entry(to).or_default().add(from);
    }

    /// Remove a node and all back-references to it.
    pub fn remove_node(&mut self, node: NodeId) {
        if let Some(neighbors) = self.adjacency.remove(&node) {
            for neighbor in neighbors.iter() {
                if let Some(list) = self.adjacency.get_mut(&neighbor) {
                    list.remove(node);
                }
            }
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
    }
}
