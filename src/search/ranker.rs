//! Search Ranker

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::{EmbedOptions, EmbeddingProvider};
use crate::error::Result;
use crate::store::Record;
use crate::vector::cosine_similarity;

/// Scores above this are highly relevant
pub const HIGH_RELEVANCE: f32 = 0.49;

/// Scores above this (and not high) are moderately relevant
pub const MEDIUM_RELEVANCE: f32 = 0.38;

/// Relevance tier of a search hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relevance {
    Low,
    Medium,
    High,
}

impl Relevance {
    pub fn classify(score: f32) -> Self {
        if score > HIGH_RELEVANCE {
            Relevance::High
        } else if score > MEDIUM_RELEVANCE {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relevance::High => write!(f, "high"),
            Relevance::Medium => write!(f, "medium"),
            Relevance::Low => write!(f, "low"),
        }
    }
}

/// One ranked record
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFact {
    pub text: String,
    pub score: f32,
}

impl RankedFact {
    pub fn relevance(&self) -> Relevance {
        Relevance::classify(self.score)
    }
}

/// Score every record against `query` and sort best first.
///
/// Equal scores keep their input order.
pub fn rank(query: &[f32], records: &[Record]) -> Vec<RankedFact> {
    let mut ranked: Vec<RankedFact> = records
        .iter()
        .map(|record| RankedFact {
            text: record.text.clone(),
            score: cosine_similarity(query, &record.embedding),
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Embeds queries and ranks records against them
#[derive(Clone)]
pub struct SearchRanker {
    provider: Arc<dyn EmbeddingProvider>,
}

impl SearchRanker {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Rank `records` against a text query. Provider failures are returned
    /// to the caller.
    pub async fn search(&self, query: &str, records: &[Record]) -> Result<Vec<RankedFact>> {
        let vector = self
            .provider
            .embed_query(query, EmbedOptions::default())
            .await?;
        let ranked = rank(&vector, records);
        debug!(
            query,
            hits = ranked.len(),
            top = ranked.first().map(|r| r.score).unwrap_or(0.0),
            "Ranked records"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingService;
    use crate::error::Error;
    use crate::testing::{MockLoader, MockModel};

    fn record(text: &str, embedding: Vec<f32>) -> Record {
        Record {
            id: 0,
            text: text.to_string(),
            embedding,
            bank: "test".to_string(),
            seq: 0,
        }
    }

    #[test]
    fn test_rank_orthogonal_example() {
        let records = vec![record("text1", vec![1.0, 0.0]), record("text2", vec![0.0, 1.0])];
        let ranked = rank(&[1.0, 0.0], &records);
        assert_eq!(
            ranked,
            vec![
                RankedFact {
                    text: "text1".into(),
                    score: 1.0
                },
                RankedFact {
                    text: "text2".into(),
                    score: 0.0
                },
            ]
        );
    }

    #[test]
    fn test_rank_descending() {
        let records = vec![
            record("far", vec![-1.0, 0.2]),
            record("near", vec![1.0, 0.1]),
            record("middle", vec![0.5, 0.5]),
        ];
        let texts: Vec<String> = rank(&[1.0, 0.0], &records)
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["near", "middle", "far"]);
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let records = vec![
            record("b", vec![0.0, 1.0]),
            record("a", vec![0.0, 2.0]),
            record("zero", vec![0.0, 0.0]),
            record("c", vec![0.0, 3.0]),
        ];
        let texts: Vec<String> = rank(&[1.0, 0.0], &records)
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["b", "a", "zero", "c"]);
    }

    #[test]
    fn test_relevance_thresholds() {
        assert_eq!(Relevance::classify(0.9), Relevance::High);
        assert_eq!(Relevance::classify(0.491), Relevance::High);
        assert_eq!(Relevance::classify(0.49), Relevance::Medium);
        assert_eq!(Relevance::classify(0.381), Relevance::Medium);
        assert_eq!(Relevance::classify(0.38), Relevance::Low);
        assert_eq!(Relevance::classify(-0.5), Relevance::Low);
        assert_eq!(Relevance::High.to_string(), "high");
    }

    #[tokio::test]
    async fn test_search_uses_query_embedding() {
        let query = "Represent this sentence for searching relevant passages: moons";
        let model = MockModel::new(2).with_vector(query, vec![0.0, 1.0]);
        let provider = Arc::new(EmbeddingService::with_defaults(Arc::new(MockLoader::new(model))));
        let ranker = SearchRanker::new(provider);

        let records = vec![record("rings", vec![1.0, 0.0]), record("moons", vec![0.0, 1.0])];
        let ranked = ranker.search("moons", &records).await.unwrap();
        assert_eq!(ranked[0].text, "moons");
        assert_eq!(ranked[0].relevance(), Relevance::High);
    }

    #[tokio::test]
    async fn test_search_propagates_provider_failure() {
        let loader = Arc::new(MockLoader::new(MockModel::new(2)).fail_loads(1));
        let ranker = SearchRanker::new(Arc::new(EmbeddingService::with_defaults(loader)));
        let err = ranker.search("anything", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ProviderInit(_)));
    }
}
