use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::scorer::{self, ScorerRegistry};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Plain-data part of the configuration. Deserializable so callers can keep
/// it in their own settings files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchDefaults {
    /// Scorer used by columns without an explicit override.
    pub scorer: String,
    /// Per-column threshold used by columns without an explicit override.
    pub threshold: f64,
    /// Minimum mean field score for a candidate to be accepted.
    pub required_threshold: f64,
    /// Minimum gap, in score points, between the best and second-best
    /// candidate. A smaller gap is ambiguous.
    pub duplicate_threshold: f64,
}

impl Default for MatchDefaults {
    fn default() -> Self {
        Self {
            scorer: scorer::WRATIO.to_string(),
            threshold: 85.0,
            required_threshold: 85.0,
            duplicate_threshold: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Column targets
// ---------------------------------------------------------------------------

/// What a scored source column is compared against on the reference side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnTarget {
    /// The same-named reference column.
    Direct(String),
    /// The same-named reference column plus each alternative; best score wins.
    Aliased(String, Vec<String>),
}

impl ColumnTarget {
    pub fn column(&self) -> &str {
        match self {
            Self::Direct(column) | Self::Aliased(column, _) => column,
        }
    }

    /// Reference columns to try, same-named column first.
    pub fn reference_columns(&self) -> Vec<&str> {
        match self {
            Self::Direct(column) => vec![column.as_str()],
            Self::Aliased(column, alternatives) => std::iter::once(column.as_str())
                .chain(alternatives.iter().map(String::as_str).filter(|alt| *alt != column.as_str()))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Matching strategy for one run. Built with the methods below, then handed
/// read-only to [`crate::engine::run`].
///
/// A column is either a blocking key or a scored column, never both: the
/// builder refuses to score a blocked column, and blocking a column removes it
/// from scoring.
#[derive(Debug, Clone, Default)]
pub struct MatchConfig {
    scorers: ScorerRegistry,
    defaults: MatchDefaults,
    columns: BTreeMap<String, ColumnTarget>,
    scorer_overrides: BTreeMap<String, String>,
    threshold_overrides: BTreeMap<String, f64>,
    block_columns: Vec<String>,
    excluded: BTreeSet<String>,
    projection: BTreeMap<String, String>,
}

impl MatchConfig {
    pub fn new(scorers: ScorerRegistry) -> Self {
        Self::with_defaults(scorers, MatchDefaults::default())
    }

    pub fn with_defaults(scorers: ScorerRegistry, defaults: MatchDefaults) -> Self {
        Self {
            scorers,
            defaults,
            columns: BTreeMap::new(),
            scorer_overrides: BTreeMap::new(),
            threshold_overrides: BTreeMap::new(),
            block_columns: Vec::new(),
            excluded: BTreeSet::new(),
            projection: BTreeMap::new(),
        }
    }

    /// Score every column the two schemas share, except blocking keys and
    /// columns excluded from scoring.
    ///
    /// Columns already configured keep their target, scorer and threshold, so
    /// calling this after overrides does not undo them.
    pub fn populate(
        &mut self,
        source_schema: &BTreeSet<String>,
        reference_schema: &BTreeSet<String>,
    ) -> &mut Self {
        for column in source_schema.intersection(reference_schema) {
            if self.is_blocked(column) || self.excluded.contains(column) {
                continue;
            }
            self.columns
                .entry(column.clone())
                .or_insert_with(|| ColumnTarget::Direct(column.clone()));
        }
        self
    }

    /// Compare `column` against the same-named reference column.
    pub fn score_column(&mut self, column: &str) -> Result<&mut Self, MatchError> {
        self.ensure_not_blocked(column)?;
        self.excluded.remove(column);
        self.columns
            .entry(column.to_string())
            .or_insert_with(|| ColumnTarget::Direct(column.to_string()));
        Ok(self)
    }

    /// Compare `column` against the same-named reference column and each of
    /// `alternatives`, keeping the best score. A blank alternative is skipped
    /// rather than scored.
    pub fn alias_column<I, S>(&mut self, column: &str, alternatives: I) -> Result<&mut Self, MatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_not_blocked(column)?;
        self.excluded.remove(column);
        let alternatives: Vec<String> = alternatives.into_iter().map(Into::into).collect();
        let target = if alternatives.is_empty() {
            ColumnTarget::Direct(column.to_string())
        } else {
            ColumnTarget::Aliased(column.to_string(), alternatives)
        };
        self.columns.insert(column.to_string(), target);
        Ok(self)
    }

    /// Override the scorer for one column. The name is resolved against the
    /// registry when matching starts. On an alias target the override applies
    /// when that column is compared as an alternative.
    pub fn scorer_for(&mut self, column: &str, scorer: &str) -> &mut Self {
        self.scorer_overrides.insert(column.to_string(), scorer.to_string());
        self
    }

    pub fn threshold_for(&mut self, column: &str, threshold: f64) -> Result<&mut Self, MatchError> {
        check_score(column, threshold)?;
        self.threshold_overrides.insert(column.to_string(), threshold);
        Ok(self)
    }

    /// Add `column` to the conjunctive blocking key and stop scoring it.
    pub fn block_on(&mut self, column: &str) -> &mut Self {
        self.columns.remove(column);
        if !self.is_blocked(column) {
            self.block_columns.push(column.to_string());
        }
        self
    }

    /// Stop scoring `column`; `populate` will not add it back.
    pub fn exclude_from_scoring(&mut self, column: &str) -> &mut Self {
        self.columns.remove(column);
        self.excluded.insert(column.to_string());
        self
    }

    /// Copy `reference_column` of the accepted candidate into the output under
    /// `output_key`.
    pub fn project(&mut self, reference_column: &str, output_key: &str) -> &mut Self {
        self.projection
            .insert(reference_column.to_string(), output_key.to_string());
        self
    }

    pub fn set_default_scorer(&mut self, scorer: &str) -> &mut Self {
        self.defaults.scorer = scorer.to_string();
        self
    }

    pub fn set_default_threshold(&mut self, threshold: f64) -> Result<&mut Self, MatchError> {
        check_score("default", threshold)?;
        self.defaults.threshold = threshold;
        Ok(self)
    }

    pub fn set_required_threshold(&mut self, threshold: f64) -> Result<&mut Self, MatchError> {
        check_score("required", threshold)?;
        self.defaults.required_threshold = threshold;
        Ok(self)
    }

    pub fn set_duplicate_threshold(&mut self, tolerance: f64) -> Result<&mut Self, MatchError> {
        check_tolerance(tolerance)?;
        self.defaults.duplicate_threshold = tolerance;
        Ok(self)
    }

    pub fn scorers(&self) -> &ScorerRegistry {
        &self.scorers
    }

    pub fn scorers_mut(&mut self) -> &mut ScorerRegistry {
        &mut self.scorers
    }

    pub fn defaults(&self) -> &MatchDefaults {
        &self.defaults
    }

    /// Scored columns, in column-name order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnTarget> {
        self.columns.values()
    }

    pub fn target(&self, column: &str) -> Option<&ColumnTarget> {
        self.columns.get(column)
    }

    /// Blocking columns, in the order they were added.
    pub fn block_columns(&self) -> &[String] {
        &self.block_columns
    }

    /// Reference column → output key.
    pub fn projection(&self) -> &BTreeMap<String, String> {
        &self.projection
    }

    pub fn scorer_name(&self, column: &str) -> &str {
        self.scorer_overrides
            .get(column)
            .map(String::as_str)
            .unwrap_or(self.defaults.scorer.as_str())
    }

    pub fn threshold(&self, column: &str) -> f64 {
        self.threshold_overrides
            .get(column)
            .copied()
            .unwrap_or(self.defaults.threshold)
    }

    /// Scorer for comparing `column` against one of its reference targets.
    /// An alternate reference column with its own override uses it; otherwise
    /// the scored column's scorer applies.
    pub fn target_scorer_name(&self, column: &str, reference_column: &str) -> &str {
        self.scorer_overrides
            .get(reference_column)
            .map(String::as_str)
            .unwrap_or_else(|| self.scorer_name(column))
    }

    /// Threshold for one reference target, resolved like [`Self::target_scorer_name`].
    pub fn target_threshold(&self, column: &str, reference_column: &str) -> f64 {
        self.threshold_overrides
            .get(reference_column)
            .copied()
            .unwrap_or_else(|| self.threshold(column))
    }

    /// Structural checks run before any record is processed.
    ///
    /// Projection columns are checked only when the reference schema is known
    /// (non-empty); an empty reference set is a data outcome, not a
    /// configuration defect.
    pub fn validate(&self, reference_schema: &BTreeSet<String>) -> Result<(), MatchError> {
        check_score("default", self.defaults.threshold)?;
        check_score("required", self.defaults.required_threshold)?;
        check_tolerance(self.defaults.duplicate_threshold)?;

        for target in self.columns.values() {
            let column = target.column();
            if self.is_blocked(column) {
                return Err(MatchError::BlockedAndScored {
                    column: column.to_string(),
                });
            }
            for reference_column in target.reference_columns() {
                let scorer = self.target_scorer_name(column, reference_column);
                if !self.scorers.contains(scorer) {
                    return Err(MatchError::UnknownScorer {
                        column: reference_column.to_string(),
                        scorer: scorer.to_string(),
                    });
                }
                check_score(reference_column, self.target_threshold(column, reference_column))?;
            }
        }

        // overrides on columns that are never scored still name a scorer
        if let Some((column, scorer)) = self
            .scorer_overrides
            .iter()
            .find(|(_, scorer)| !self.scorers.contains(scorer))
        {
            return Err(MatchError::UnknownScorer {
                column: column.clone(),
                scorer: scorer.clone(),
            });
        }

        if !reference_schema.is_empty() {
            if let Some(missing) = self
                .projection
                .keys()
                .find(|column| !reference_schema.contains(*column))
            {
                return Err(MatchError::UnknownProjectionColumn {
                    column: missing.clone(),
                });
            }
        }

        Ok(())
    }

    fn is_blocked(&self, column: &str) -> bool {
        self.block_columns.iter().any(|c| c == column)
    }

    fn ensure_not_blocked(&self, column: &str) -> Result<(), MatchError> {
        if self.is_blocked(column) {
            return Err(MatchError::BlockedAndScored {
                column: column.to_string(),
            });
        }
        Ok(())
    }
}

fn check_score(column: &str, value: f64) -> Result<(), MatchError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(MatchError::InvalidThreshold {
            column: column.to_string(),
            value,
        });
    }
    Ok(())
}

fn check_tolerance(value: f64) -> Result<(), MatchError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MatchError::InvalidThreshold {
            column: "duplicate".to_string(),
            value,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
