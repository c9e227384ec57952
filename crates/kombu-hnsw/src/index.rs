//! HNSW index implementation.
//!
//! Insertions grow a layered proximity graph; searches greedily descend
//! the layers and run a bounded best-first expansion at layer 0. All
//! distances are cosine (`1 - cosine_similarity`).

use crate::graph::{Neighbors, NodeId};
use crate::layer::{assign_level, Layers};
use kombu_vector::similarity;
use kombu_vector::{validate_vector, IdFilter, Result, SearchHit, VectorError, VectorIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use uuid::Uuid;

/// HNSW configuration parameters. Fields omitted from a serialized
/// config fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Max connections per node per layer above 0.
    pub m: usize,

    /// Max connections at layer 0, conventionally `2 * m`.
    pub m_max0: usize,

    /// Candidate list width during construction. Higher = better graph,
    /// slower build.
    pub ef_construction: usize,

    /// Candidate list width during search. Higher = better recall,
    /// slower query.
    pub ef_search: usize,

    /// Layer stack height. 16 supports ~10^7 vectors.
    pub max_layers: usize,

    /// Seed for level assignment. Two indexes built with the same seed
    /// and the same insertion order produce the same graph.
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            m_max0: 32,
            ef_construction: 200,
            ef_search: 100,
            max_layers: 16,
            seed: 42,
        }
    }
}

/// One stored node. Slots are tombstoned (`None`) on delete and never
/// reused, so `NodeId`s remain stable.
#[derive(Debug, Clone)]
struct Node {
    id: Uuid,
    vector: Vec<f32>,
    norm: f32,
    level: usize,
}

/// Search candidate ordered by (distance, node id) for deterministic
/// heap behavior.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    node_id: NodeId,
    distance: f32,
}

impl Candidate {
    fn new(node_id: NodeId, distance: f32) -> Self {
        Self { node_id, distance }
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

/// HNSW index.
pub struct HnswIndex {
    config: HnswConfig,
    dimension: usize,
    layers: Layers,
    nodes: Vec<Option<Node>>,
    by_id: HashMap<Uuid, NodeId>,
    entry_point: Option<NodeId>,
    top_level: usize,
    rng: StdRng,
}

impl HnswIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        let layers = Layers::new(config.max_layers);
        let rng = StdRng::seed_from_u64(config.seed);

        Self {
            config,
            dimension,
            layers,
            nodes: Vec::new(),
            by_id: HashMap::new(),
            entry_point: None,
            top_level: 0,
            rng,
        }
    }

    /// Configuration this index was built with.
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize).and_then(|slot| slot.as_ref())
    }

    fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m_max0
        } else {
            self.config.m
        }
    }

    fn distance_to_query(&self, query: &[f32], query_norm: f32, node: &Node) -> f32 {
        let dot = similarity::dot_unchecked(query, &node.vector);
        1.0 - similarity::cosine_from_parts(dot, query_norm, node.norm)
    }

    fn distance_between(&self, a: NodeId, b: NodeId) -> f32 {
        match (self.node(a), self.node(b)) {
            (Some(na), Some(nb)) => {
                let dot = similarity::dot_unchecked(&na.vector, &nb.vector);
                1.0 - similarity::cosine_from_parts(dot, na.norm, nb.norm)
            }
            _ => f32::MAX,
        }
    }

    /// Best-first search at one layer.
    ///
    /// Maintains a min-heap of frontier candidates and a max-heap of the
    /// `ef` nearest found so far; stops when the closest frontier entry is
    /// farther than the worst kept result. Returns candidates sorted
    /// closest-first.
    ///
    /// Neighbor lists can reference tombstoned slots (a shrink may leave
    /// one-directional edges behind); those are skipped on visit.
    fn search_layer(
        &self,
        query: &[f32],
        query_norm: f32,
        entry_points: &[NodeId],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let Some(layer_graph) = self.layers.get(layer) else {
            return Vec::new();
        };

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let Some(node) = self.node(ep) else { continue };
            let dist = self.distance_to_query(query, query_norm, node);
            frontier.push(Reverse(Candidate::new(ep, dist)));
            results.push(Candidate::new(ep, dist));
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            let Some(neighbors) = layer_graph.neighbors(current.node_id) else {
                continue;
            };

            for neighbor in neighbors.iter() {
                if !visited.insert(neighbor) {
                    continue;
                }
                let Some(node) = self.node(neighbor) else { continue };

                let dist = self.distance_to_query(query, query_norm, node);
                let keep = results.len() < ef
                    || results.peek().map(|w| dist < w.distance).unwrap_or(true);

                if keep {
                    frontier.push(Reverse(Candidate::new(neighbor, dist)));
                    results.push(Candidate::new(neighbor, dist));
                    while results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Heuristic neighbor selection.
    ///
    /// Walks candidates closest-first and accepts one only if no
    /// already-selected neighbor is closer to it than it is to the query
    /// node. This spreads links across directions instead of clustering
    /// them, which keeps the graph navigable.
    fn select_diverse(&self, candidates: &[Candidate], cap: usize) -> Vec<NodeId> {
        let mut selected: Vec<Candidate> = Vec::with_capacity(cap);

        for candidate in candidates {
            if selected.len() == cap {
                break;
            }
            let diverse = selected
                .iter()
                .all(|s| self.distance_between(candidate.node_id, s.node_id) >= candidate.distance);
            if diverse {
                selected.push(candidate.clone());
            }
        }

        selected.into_iter().map(|c| c.node_id).collect()
    }

    /// Re-apply the selection heuristic to a node whose neighbor list
    /// exceeds the layer cap after gaining a back-link.
    fn shrink_if_needed(&mut self, node: NodeId, layer: usize) {
        let cap = self.max_degree(layer);

        let over: Vec<NodeId> = match self.layers.get(layer).and_then(|lg| lg.neighbors(node)) {
            Some(list) if list.len() > cap => list.iter().collect(),
            _ => return,
        };

        let mut scored: Vec<Candidate> = over
            .into_iter()
            .map(|n| Candidate::new(n, self.distance_between(node, n)))
            .collect();
        scored.sort();

        let keep: Neighbors = self.select_diverse(&scored, cap).into_iter().collect();
        if let Some(layer_graph) = self.layers.get_mut(layer) {
            layer_graph.set_neighbors(node, keep);
        }
    }

    /// Pick a new entry point after the current one was deleted: the
    /// highest-layer survivor, ties broken by smallest node id.
    fn promote_entry_point(&mut self) {
        let best = self
            .by_id
            .values()
            .copied()
            .filter_map(|nid| self.node(nid).map(|n| (n.level, Reverse(nid))))
            .max();

        match best {
            Some((level, Reverse(nid))) => {
                self.entry_point = Some(nid);
                self.top_level = level;
            }
            None => {
                self.entry_point = None;
                self.top_level = 0;
            }
        }
    }
}

impl VectorIndex for HnswIndex {
    fn build(&mut self, entries: Vec<(Uuid, Vec<f32>)>) -> Result<()> {
        self.clear();
        for (id, vector) in entries {
            self.insert(id, vector)?;
        }
        Ok(())
    }

    fn insert(&mut self, id: Uuid, vector: Vec<f32>) -> Result<()> {
        validate_vector(&vector, self.dimension)?;
        if self.by_id.contains_key(&id) {
            return Err(VectorError::Duplicate(id));
        }

        let norm = similarity::norm(&vector);
        let level = assign_level(&mut self.rng, self.config.m, self.config.max_layers);

        let node_id = self.nodes.len() as NodeId;
        self.nodes.push(Some(Node {
            id,
            vector: vector.clone(),
            norm,
            level,
        }));
        self.by_id.insert(id, node_id);

        for l in 0..=level {
            if let Some(layer) = self.layers.get_mut(l) {
                layer.ensure_node(node_id);
            }
        }

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node_id);
            self.top_level = level;
            return Ok(());
        };

        // Greedy descent through layers above the node's level, tracking a
        // single current-best entry point.
        let mut eps = vec![entry];
        for l in ((level + 1)..=self.top_level).rev() {
            let best = self.search_layer(&vector, norm, &eps, 1, l);
            if let Some(top) = best.first() {
                eps = vec![top.node_id];
            }
        }

        // Link into every layer from the node's level down to 0.
        for l in (0..=level.min(self.top_level)).rev() {
            let candidates =
                self.search_layer(&vector, norm, &eps, self.config.ef_construction, l);
            let cap = self.max_degree(l);
            let selected = self.select_diverse(&candidates, cap);

            if let Some(layer_graph) = self.layers.get_mut(l) {
                for &neighbor in &selected {
                    layer_graph.add_edge(node_id, neighbor);
                }
            }
            for &neighbor in &selected {
                self.shrink_if_needed(neighbor, l);
            }

            eps = candidates.into_iter().map(|c| c.node_id).collect();
            if eps.is_empty() {
                eps = vec![entry];
            }
        }

        if level > self.top_level {
            self.entry_point = Some(node_id);
            self.top_level = level;
        }

        Ok(())
    }

    fn delete(&mut self, id: &Uuid) -> bool {
        let Some(node_id) = self.by_id.remove(id) else {
            return false;
        };

        let level = self.node(node_id).map(|n| n.level).unwrap_or(0);
        for l in 0..=level {
            if let Some(layer) = self.layers.get_mut(l) {
                layer.remove_node(node_id);
            }
        }
        self.nodes[node_id as usize] = None;

        if self.entry_point == Some(node_id) {
            self.promote_entry_point();
        }
        true
    }

    fn search(&self, query: &[f32], k: usize, filter: Option<&IdFilter>) -> Result<Vec<SearchHit>> {
        validate_vector(query, self.dimension)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let query_norm = similarity::norm(query);

        let mut eps = vec![entry];
        for l in (1..=self.top_level).rev() {
            let best = self.search_layer(query, query_norm, &eps, 1, l);
            if let Some(top) = best.first() {
                eps = vec![top.node_id];
            }
        }

        let ef = self.config.ef_search.max(k);
        let candidates = self.search_layer(query, query_norm, &eps, ef, 0);

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|c| {
                let node = self.node(c.node_id)?;
                if let Some(filter) = filter {
                    if !filter(&node.id) {
                        return None;
                    }
                }
                Some(SearchHit::new(node.id, 1.0 - c.distance))
            })
            .collect();

        // Candidate order is by node id on ties; re-sort so ties break by
        // chunk id as the contract requires.
        hits.sort();
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.by_id.clear();
        self.layers.clear();
        self.entry_point = None;
        self.top_level = 0;
        // Re-seed so rebuilds are reproducible for a fixed seed.
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }
}
