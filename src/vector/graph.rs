//! Neighbor Graph
//!
//! Sparse top-K similarity graph over a bank's vectors.

use super::similarity::similarity_matrix;

/// Default number of neighbors kept per node
pub const DEFAULT_NEIGHBORS: usize = 3;

/// Default minimum similarity for an edge (exclusive)
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Graph construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphParams {
    /// Maximum out-degree per node
    pub k: usize,
    /// Edges must score strictly above this
    pub threshold: f32,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_NEIGHBORS,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl GraphParams {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// A directed edge to a neighboring node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the target node
    pub index: usize,
    /// Cosine similarity between the two nodes
    pub score: f32,
}

/// Directed top-K adjacency, one list per input vector.
///
/// Mutual edges appear once in each endpoint's list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborGraph {
    adjacency: Vec<Vec<Neighbor>>,
}

impl NeighborGraph {
    /// Number of nodes
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Outgoing edges of a node, best first
    pub fn neighbors(&self, node: usize) -> &[Neighbor] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of directed edges
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Iterate `(source, neighbor)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (usize, Neighbor)> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(source, list)| list.iter().map(move |n| (source, *n)))
    }
}

/// Build the neighbor graph for a list of vectors.
///
/// For every node the similarity row is scanned repeatedly: each pass takes
/// the maximum remaining score (lowest index wins on ties), keeps it if it
/// beats the threshold, and removes it from the working row.
pub fn build_neighbor_graph(vectors: &[Vec<f32>], params: GraphParams) -> NeighborGraph {
    let matrix = similarity_matrix(vectors);

    let adjacency = matrix
        .into_iter()
        .enumerate()
        .map(|(node, row)| top_k(node, row, params))
        .collect();

    NeighborGraph { adjacency }
}

fn top_k(node: usize, mut row: Vec<f32>, params: GraphParams) -> Vec<Neighbor> {
    let mut picked = Vec::with_capacity(params.k.min(row.len()));
    let mut taken = vec![false; row.len()];
    taken[node] = true;
    row[node] = 0.0;

    while picked.len() < params.k {
        let mut best: Option<(usize, f32)> = None;
        for (j, &score) in row.iter().enumerate() {
            if taken[j] {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((j, score)),
            }
        }

        match best {
            Some((index, score)) if score > params.threshold => {
                taken[index] = true;
                picked.push(Neighbor { index, score });
            }
            _ => break,
        }
    }

    picked
}
