//! Test doubles for the storage engine and the embedding model.
//!
//! Provides scripted, failure-injecting implementations used by the unit
//! tests and the integration tests.

mod flaky_engine;
mod mock_model;

pub use flaky_engine::{FlakyConnection, FlakyEngine};
pub use mock_model::{MockLoader, MockModel, Pause};
