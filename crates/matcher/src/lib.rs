//! `scorecard-matcher`: fuzzy tabular record matcher.
//!
//! Reconciles scraped candidate rows against a canonical reference set so a
//! stable candidate identifier can be attached. Pure engine crate: receives
//! pre-loaded records, returns classified results. No I/O.

pub mod assemble;
pub mod blocking;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod progress;
pub mod scorer;
pub mod similarity;

pub use config::{ColumnTarget, MatchConfig, MatchDefaults};
pub use engine::{run, run_with_observer};
pub use error::MatchError;
pub use model::{schema_of, Classification, MatchDiagnostics, MatchOutcome, MatchResult, Record, Records};
pub use progress::{MatchObserver, NullObserver, RecordReport};
pub use scorer::ScorerRegistry;
