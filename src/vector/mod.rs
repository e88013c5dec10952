//! Vector Module
//!
//! Similarity computations and neighbor-graph construction.

mod graph;
mod similarity;

pub use graph::{
    build_neighbor_graph, GraphParams, Neighbor, NeighborGraph, DEFAULT_NEIGHBORS,
    DEFAULT_THRESHOLD,
};
pub use similarity::{
    cosine_similarity, dot_product, magnitude, normalize_vector, similarity_matrix,
};
