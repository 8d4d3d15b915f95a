use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One row: column name → value. A missing column reads as blank.
pub type Record = BTreeMap<String, String>;

/// Rows keyed by their integer index, iterated in index order.
pub type Records = BTreeMap<usize, Record>;

/// Union of column names over every row.
pub fn schema_of(records: &Records) -> BTreeSet<String> {
    records
        .values()
        .flat_map(|row| row.keys().cloned())
        .collect()
}

/// Value of `column` in `row`, blank when absent.
pub(crate) fn field<'a>(row: &'a Record, column: &str) -> &'a str {
    row.get(column).map(String::as_str).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched,
    Unmatched,
    Ambiguous,
    NoCandidates,
}

impl MatchOutcome {
    pub const ALL: [MatchOutcome; 4] = [
        Self::Matched,
        Self::Unmatched,
        Self::Ambiguous,
        Self::NoCandidates,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::Ambiguous => "ambiguous",
            Self::NoCandidates => "no_candidates",
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How one source record was resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub outcome: MatchOutcome,
    /// Index of the accepted reference record (MATCHED only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_index: Option<usize>,
    /// Overall score of the best surviving candidate, if any survived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Overall score of the second-best survivor, if there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_up_score: Option<f64>,
    /// Per-column field scores of the best surviving candidate.
    pub field_scores: BTreeMap<String, f64>,
    /// Size of the blocking partition the record was scored against.
    pub candidates: usize,
}

impl Classification {
    pub(crate) fn without_candidates() -> Self {
        Self {
            outcome: MatchOutcome::NoCandidates,
            reference_index: None,
            score: None,
            runner_up_score: None,
            field_scores: BTreeMap::new(),
            candidates: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics + Output
// ---------------------------------------------------------------------------

/// Per-outcome counts. Every category is always present, zero or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MatchDiagnostics {
    counts: BTreeMap<MatchOutcome, usize>,
}

impl MatchDiagnostics {
    pub fn new() -> Self {
        Self {
            counts: MatchOutcome::ALL.iter().map(|o| (*o, 0)).collect(),
        }
    }

    pub fn record(&mut self, outcome: MatchOutcome) {
        *self.counts.entry(outcome).or_insert(0) += 1;
    }

    pub fn count(&self, outcome: MatchOutcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Share of records that resolved to MATCHED; 0 for an empty run.
    pub fn resolved_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(MatchOutcome::Matched) as f64 / total as f64,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MatchOutcome, usize)> + '_ {
        self.counts.iter().map(|(o, n)| (*o, *n))
    }
}

impl Default for MatchDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = MatchOutcome::ALL
            .iter()
            .map(|o| o.label().len())
            .max()
            .unwrap_or(0);
        for (outcome, count) in self.iter() {
            writeln!(f, "{:>width$}: {count}", outcome.label())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Source rows, in source order, with projected reference columns merged
    /// in. Rows that did not match carry the projected keys with blank values.
    pub records: Records,
    pub classifications: BTreeMap<usize, Classification>,
    pub diagnostics: MatchDiagnostics,
}
