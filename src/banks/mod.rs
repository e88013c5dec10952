//! Bank Module
//!
//! Built-in and custom fact banks, and the service that ties them to the
//! store, the embedding provider and the search/graph views.

mod builtin;
mod custom;
mod service;

pub use builtin::{
    builtin, is_builtin, BuiltinBank, BUILTIN_BANKS, COMPUTING, OCEAN_LIFE, SOLAR_SYSTEM,
};
pub use custom::{parse_custom_bank, MAX_CUSTOM_ENTRIES};
pub use service::{BankGraph, BankInfo, BankKind, BankService};
