//! Layer management and level assignment.

use crate::graph::{LayerGraph, NodeId};
use rand::rngs::StdRng;
use rand::Rng;

/// The stack of layer graphs, index 0 = bottom.
pub struct Layers {
    layers: Vec<LayerGraph>,
}

impl Layers {
    pub fn new(max_layers: usize) -> Self {
        let layers = (0..max_layers).map(|_| LayerGraph::new()).collect();
        Self { layers }
    }

    pub fn get(&self, layer: usize) -> Option<&LayerGraph> {
        self.layers.get(layer)
    }

    pub fn get_mut(&mut self, layer: usize) -> Option<&mut LayerGraph> {
        self.layers.get_mut(layer)
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Remove a node from every layer it appears in.
    pub fn remove_node(&mut self, node: NodeId) {
        for layer in &mut self.layers {
            layer.remove_node(node);
        }
    }

    pub fn clear(&mut self) {
        for layer in &mut self.layers {
            layer.clear();
        }
    }
}

/// Draw the top layer for a new node: `floor(-ln(U) * mL)` with
/// `mL = 1/ln(m)`, giving roughly `1/m^L` mass at layer `L`.
///
/// The lower bound on `U` avoids `ln(0)`; the result is capped to the
/// layer stack.
pub fn assign_level(rng: &mut StdRng, m: usize, max_layers: usize) -> usize {
    let m_l = if m > 1 { 1.0 / (m as f64).ln() } else { 1.0 };
    let uniform: f64 = rng.gen_range(0.0001..1.0);
    let level = (-uniform.ln() * m_l).floor() as usize;
    level.min(max_layers.saturating_sub(1))
}
