//! Search Module
//!
//! Ranks a bank's records against a query by cosine similarity.

mod ranker;

pub use ranker::{rank, RankedFact, Relevance, SearchRanker, HIGH_RELEVANCE, MEDIUM_RELEVANCE};
