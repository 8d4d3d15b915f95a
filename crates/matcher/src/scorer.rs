//! Column scorer registry: name → similarity function.
//!
//! Each `MatchConfig` owns its registry, so two matching runs never share a
//! scorer table. Registering under an existing name replaces the old entry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::similarity;

/// A similarity function over two normalized values, returning 0–100.
pub type ScoreFn = Arc<dyn Fn(&str, &str) -> f64 + Send + Sync>;

pub const RATIO: &str = "ratio";
pub const PARTIAL_RATIO: &str = "partial_ratio";
pub const TOKEN_SORT_RATIO: &str = "token_sort_ratio";
pub const TOKEN_SET_RATIO: &str = "token_set_ratio";
pub const PARTIAL_TOKEN_RATIO: &str = "partial_token_ratio";
pub const WRATIO: &str = "wratio";
pub const JARO_WINKLER: &str = "jaro_winkler";
pub const EXACT: &str = "exact";

#[derive(Clone)]
pub struct ScorerRegistry {
    scorers: BTreeMap<String, ScoreFn>,
}

impl ScorerRegistry {
    /// An empty registry. Most callers want [`ScorerRegistry::with_builtins`].
    pub fn empty() -> Self {
        Self {
            scorers: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(RATIO, similarity::ratio);
        registry.register(PARTIAL_RATIO, similarity::partial_ratio);
        registry.register(TOKEN_SORT_RATIO, similarity::token_sort_ratio);
        registry.register(TOKEN_SET_RATIO, similarity::token_set_ratio);
        registry.register(PARTIAL_TOKEN_RATIO, similarity::partial_token_ratio);
        registry.register(WRATIO, similarity::wratio);
        registry.register(JARO_WINKLER, similarity::jaro_winkler);
        registry.register(EXACT, similarity::exact);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, scorer: F)
    where
        F: Fn(&str, &str) -> f64 + Send + Sync + 'static,
    {
        self.scorers.insert(name.into(), Arc::new(scorer));
    }

    pub fn get(&self, name: &str) -> Option<&ScoreFn> {
        self.scorers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scorers.contains_key(name)
    }
}

impl Default for ScorerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.scorers.keys()).finish()
    }
}

/// Score two already-normalized values.
///
/// Two blank values agree (100); a blank against a non-blank never does (0).
/// The scorer's result is clamped into 0–100 so a custom function cannot push
/// a candidate past the gates.
pub fn score_values(scorer: &ScoreFn, a: &str, b: &str) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 100.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => {
            let score = scorer(a, b);
            if score.is_nan() { 0.0 } else { score.clamp(0.0, 100.0) }
        }
    }
}
