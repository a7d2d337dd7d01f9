//! Statistical calculators over token sequences.
//!
//! Every calculator is a pure function of its inputs: no shared state, no
//! blocking, and degenerate input (empty sequences, a single token, zero
//! vocabulary) produces zeros rather than errors. Outputs are named maps
//! that the [`AnalysisEngine`](crate::engine::AnalysisEngine) merges under a
//! calculator-specific prefix.
//!
//! | calculator | input | prefix |
//! |---|---|---|
//! | [`entropy::EntropyCalculator`] | token texts | `entropy_` |
//! | [`compression::CompressionCalculator`] | text, tokens, entropy | `compression_` |
//! | [`reuse::ReuseCalculator`] | token texts | `reuse_` |
//! | [`drift`] | two token sequences | keyed per tokenizer pair |

pub mod compression;
pub mod drift;
pub mod entropy;
pub mod reuse;
pub mod stats;

use std::collections::BTreeMap;

pub use compression::{CompressionCalculator, CompressionConfig};
pub use drift::{calculate_drift, cross_tokenizer_drift};
pub use entropy::{EntropyCalculator, EntropyConfig, NormalizationKind};
pub use reuse::{ReuseCalculator, ReuseConfig, ReuseReport, TokenFrequency};

/// Named scalar outputs of one calculator, sorted by name.
pub type MetricValues = BTreeMap<String, f64>;
