use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, info, warn};

use crate::assemble::assemble;
use crate::blocking::BlockingIndex;
use crate::config::MatchConfig;
use crate::error::MatchError;
use crate::model::{field, schema_of, Classification, MatchDiagnostics, MatchOutcome, MatchResult, Records};
use crate::progress::{MatchObserver, NullObserver, RecordReport};
use crate::scorer::{score_values, ScoreFn};
use crate::similarity::normalize;

/// Match every source record against the reference set.
pub fn run(config: &MatchConfig, source: &Records, reference: &Records) -> Result<MatchResult, MatchError> {
    run_with_observer(config, source, reference, &mut NullObserver)
}

/// [`run`], reporting each classified record to `observer`.
///
/// Configuration is validated before the first record is touched; after that
/// nothing fails. Every source record ends up in exactly one outcome.
pub fn run_with_observer(
    config: &MatchConfig,
    source: &Records,
    reference: &Records,
    observer: &mut dyn MatchObserver,
) -> Result<MatchResult, MatchError> {
    config.validate(&schema_of(reference))?;
    let plan = compile(config)?;
    let index = BlockingIndex::build(config.block_columns(), reference);
    let prepared = prepare_reference(&plan, reference);
    let acceptance = Acceptance {
        required: config.defaults().required_threshold,
        duplicate: config.defaults().duplicate_threshold,
    };

    info!(
        "matching {} source records against {} reference records ({} partitions, {} scored columns)",
        source.len(),
        reference.len(),
        index.partition_count(),
        plan.len()
    );

    let mut notifier = Notifier::new(observer);
    notifier.begin(source.len());

    let mut classifications = BTreeMap::new();
    for (position, (source_index, row)) in source.iter().enumerate() {
        let source_values: Vec<String> = plan
            .iter()
            .map(|column| normalize(field(row, &column.column)))
            .collect();
        let pool = index.candidates_for(row);
        let classification = classify(&plan, &source_values, pool, &prepared, acceptance);

        debug!(
            "source {source_index}: {} (candidates={}, score={:?}, reference={:?})",
            classification.outcome,
            classification.candidates,
            classification.score,
            classification.reference_index
        );

        notifier.record_done(&RecordReport {
            position,
            total: source.len(),
            source_index: *source_index,
            classification: &classification,
        });
        classifications.insert(*source_index, classification);
    }

    let (records, diagnostics) = assemble(source, reference, &classifications, config.projection());
    notifier.finish(&diagnostics);

    info!(
        "match summary: matched={} unmatched={} ambiguous={} no_candidates={}",
        diagnostics.count(MatchOutcome::Matched),
        diagnostics.count(MatchOutcome::Unmatched),
        diagnostics.count(MatchOutcome::Ambiguous),
        diagnostics.count(MatchOutcome::NoCandidates)
    );

    Ok(MatchResult {
        records,
        classifications,
        diagnostics,
    })
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One scored column with each reference target resolved.
struct ColumnPlan {
    column: String,
    targets: Vec<TargetPlan>,
}

/// A reference column compared against the scored column. The first target is
/// the same-named column; the rest are alternates.
struct TargetPlan {
    reference_column: String,
    alternate: bool,
    scorer: ScoreFn,
    threshold: f64,
}

#[derive(Clone, Copy)]
struct Acceptance {
    required: f64,
    duplicate: f64,
}

fn compile(config: &MatchConfig) -> Result<Vec<ColumnPlan>, MatchError> {
    config
        .columns()
        .map(|target| {
            let column = target.column();
            let targets = target
                .reference_columns()
                .into_iter()
                .map(|reference_column| {
                    let scorer_name = config.target_scorer_name(column, reference_column);
                    let scorer = config
                        .scorers()
                        .get(scorer_name)
                        .ok_or_else(|| MatchError::UnknownScorer {
                            column: reference_column.to_string(),
                            scorer: scorer_name.to_string(),
                        })?;
                    Ok(TargetPlan {
                        reference_column: reference_column.to_string(),
                        alternate: reference_column != column,
                        scorer: scorer.clone(),
                        threshold: config.target_threshold(column, reference_column),
                    })
                })
                .collect::<Result<Vec<_>, MatchError>>()?;
            Ok(ColumnPlan {
                column: column.to_string(),
                targets,
            })
        })
        .collect()
}

/// Normalized reference values per row: one entry per plan column, each
/// holding the values of that column's reference targets.
type PreparedRow = Vec<Vec<String>>;

fn prepare_reference(plan: &[ColumnPlan], reference: &Records) -> BTreeMap<usize, PreparedRow> {
    reference
        .iter()
        .map(|(index, row)| {
            let values: PreparedRow = plan
                .iter()
                .map(|column| {
                    column
                        .targets
                        .iter()
                        .map(|t| normalize(field(row, &t.reference_column)))
                        .collect()
                })
                .collect();
            (*index, values)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scoring + selection
// ---------------------------------------------------------------------------

struct Survivor {
    reference_index: usize,
    overall: f64,
    field_scores: Vec<f64>,
}

/// Field scores for one candidate, or `None` as soon as any column misses its
/// threshold.
///
/// A column's score is the best over the reference targets that clear their
/// own threshold. Blank alternates are skipped, so a blank source value can
/// only agree with a blank same-named column.
fn gate(plan: &[ColumnPlan], source_values: &[String], candidate: &PreparedRow) -> Option<Vec<f64>> {
    let mut scores = Vec::with_capacity(plan.len());
    for ((column, source_value), reference_values) in plan.iter().zip(source_values).zip(candidate) {
        let best = column
            .targets
            .iter()
            .zip(reference_values)
            .filter(|(target, value)| !(target.alternate && value.is_empty()))
            .map(|(target, value)| (target, score_values(&target.scorer, source_value, value)))
            .filter(|(target, score)| *score >= target.threshold)
            .map(|(_, score)| score)
            .reduce(f64::max)?;
        scores.push(best);
    }
    Some(scores)
}

/// Unweighted mean. With no scored columns every candidate agrees vacuously.
fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 100.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

fn classify(
    plan: &[ColumnPlan],
    source_values: &[String],
    pool: &[usize],
    prepared: &BTreeMap<usize, PreparedRow>,
    acceptance: Acceptance,
) -> Classification {
    if pool.is_empty() {
        return Classification::without_candidates();
    }

    let mut survivors: Vec<Survivor> = pool
        .iter()
        .filter_map(|ri| {
            let candidate = prepared.get(ri)?;
            let field_scores = gate(plan, source_values, candidate)?;
            let overall = mean(&field_scores);
            (overall >= acceptance.required).then_some(Survivor {
                reference_index: *ri,
                overall,
                field_scores,
            })
        })
        .collect();

    survivors.sort_by(|a, b| {
        b.overall
            .total_cmp(&a.overall)
            .then(a.reference_index.cmp(&b.reference_index))
    });

    let field_scores = |s: &Survivor| -> BTreeMap<String, f64> {
        plan.iter()
            .map(|c| c.column.clone())
            .zip(s.field_scores.iter().copied())
            .collect()
    };

    let mut classification = Classification {
        outcome: MatchOutcome::Unmatched,
        reference_index: None,
        score: None,
        runner_up_score: None,
        field_scores: BTreeMap::new(),
        candidates: pool.len(),
    };

    match survivors.as_slice() {
        [] => {}
        [only] => {
            classification.outcome = MatchOutcome::Matched;
            classification.reference_index = Some(only.reference_index);
            classification.score = Some(only.overall);
            classification.field_scores = field_scores(only);
        }
        [best, second, ..] => {
            classification.score = Some(best.overall);
            classification.runner_up_score = Some(second.overall);
            classification.field_scores = field_scores(best);
            if best.overall - second.overall < acceptance.duplicate {
                classification.outcome = MatchOutcome::Ambiguous;
            } else {
                classification.outcome = MatchOutcome::Matched;
                classification.reference_index = Some(best.reference_index);
            }
        }
    }

    classification
}

// ---------------------------------------------------------------------------
// Observer isolation
// ---------------------------------------------------------------------------

/// Forwards engine events to the caller's observer. A panic inside the
/// observer detaches it; the run carries on without it.
struct Notifier<'a> {
    observer: Option<&'a mut dyn MatchObserver>,
}

impl<'a> Notifier<'a> {
    fn new(observer: &'a mut dyn MatchObserver) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    fn begin(&mut self, total: usize) {
        self.notify(|o| o.begin(total));
    }

    fn record_done(&mut self, report: &RecordReport<'_>) {
        self.notify(|o| o.record_done(report));
    }

    fn finish(&mut self, diagnostics: &MatchDiagnostics) {
        self.notify(|o| o.finish(diagnostics));
    }

    fn notify(&mut self, event: impl FnOnce(&mut dyn MatchObserver)) {
        let Some(observer) = self.observer.as_mut() else {
            return;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| event(&mut **observer)));
        if outcome.is_err() {
            warn!("progress observer panicked; further progress events are dropped");
            self.observer = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::scorer::ScorerRegistry;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Scores are the number parsed from the reference value, so tests can
    /// dictate exact field scores.
    fn dictated_config(columns: &[&str]) -> MatchConfig {
        let mut scorers = ScorerRegistry::with_builtins();
        scorers.register("dictated", |_, reference: &str| reference.parse().unwrap_or(0.0));
        let mut config = MatchConfig::new(scorers);
        config.set_default_scorer("dictated");
        config.set_default_threshold(0.0).unwrap();
        config.set_required_threshold(0.0).unwrap();
        for c in columns {
            config.score_column(c).unwrap();
        }
        config
    }

    fn source_one() -> Records {
        Records::from([(0, row(&[("a", "x"), ("b", "x")]))])
    }

    #[test]
    fn gap_equal_to_tolerance_is_matched() {
        let mut config = dictated_config(&["a"]);
        config.set_duplicate_threshold(3.0).unwrap();
        let reference = Records::from([(0, row(&[("a", "97")])), (1, row(&[("a", "100")]))]);
        let result = run(&config, &source_one(), &reference).unwrap();
        let c = &result.classifications[&0];
        assert_eq!(c.outcome, MatchOutcome::Matched);
        assert_eq!(c.reference_index, Some(1));
        assert_eq!(c.score, Some(100.0));
        assert_eq!(c.runner_up_score, Some(97.0));
    }

    #[test]
    fn gap_below_tolerance_is_ambiguous() {
        let mut config = dictated_config(&["a"]);
        config.set_duplicate_threshold(3.0).unwrap();
        let reference = Records::from([(0, row(&[("a", "98")])), (1, row(&[("a", "100")]))]);
        let result = run(&config, &source_one(), &reference).unwrap();
        let c = &result.classifications[&0];
        assert_eq!(c.outcome, MatchOutcome::Ambiguous);
        assert_eq!(c.reference_index, None);
    }

    #[test]
    fn one_failed_gate_disqualifies_despite_high_mean() {
        let mut config = dictated_config(&["a", "b"]);
        config.threshold_for("b", 90.0).unwrap();
        config.set_required_threshold(80.0).unwrap();
        // mean 94.5 clears 80, but b = 89 misses its own gate
        let reference = Records::from([(0, row(&[("a", "100"), ("b", "89")]))]);
        let result = run(&config, &source_one(), &reference).unwrap();
        assert_eq!(result.classifications[&0].outcome, MatchOutcome::Unmatched);
    }

    #[test]
    fn mean_below_required_is_unmatched() {
        let mut config = dictated_config(&["a", "b"]);
        config.set_required_threshold(90.0).unwrap();
        let reference = Records::from([(0, row(&[("a", "100"), ("b", "70")]))]);
        let result = run(&config, &source_one(), &reference).unwrap();
        assert_eq!(result.classifications[&0].outcome, MatchOutcome::Unmatched);
        assert_eq!(result.classifications[&0].candidates, 1);
    }

    #[test]
    fn field_score_is_best_over_aliases() {
        let mut config = dictated_config(&[]);
        config.alias_column("a", ["alt1", "alt2"]).unwrap();
        config.threshold_for("a", 90.0).unwrap();
        let reference = Records::from([(0, row(&[("a", "10"), ("alt1", "95"), ("alt2", "40")]))]);
        let result = run(&config, &source_one(), &reference).unwrap();
        let c = &result.classifications[&0];
        assert_eq!(c.outcome, MatchOutcome::Matched);
        assert_eq!(c.field_scores["a"], 95.0);
    }

    #[test]
    fn blank_source_value_does_not_agree_with_blank_alternate() {
        let mut config = MatchConfig::default();
        config.alias_column("firstname", ["nickname"]).unwrap();
        config.score_column("lastname").unwrap();
        let source = Records::from([(0, row(&[("firstname", ""), ("lastname", "Smith")]))]);
        let reference = Records::from([
            (0, row(&[("firstname", "William"), ("nickname", ""), ("lastname", "Smith")])),
            (1, row(&[("firstname", ""), ("nickname", "Bill"), ("lastname", "Smith")])),
        ]);

        let result = run(&config, &source, &reference).unwrap();
        let c = &result.classifications[&0];
        assert_eq!(c.outcome, MatchOutcome::Matched);
        assert_eq!(c.reference_index, Some(1));
        assert_eq!(c.runner_up_score, None);
        assert_eq!(c.field_scores["firstname"], 100.0);

        let only_william = Records::from([(0, reference[&0].clone())]);
        let result = run(&config, &source, &only_william).unwrap();
        assert_eq!(result.classifications[&0].outcome, MatchOutcome::Unmatched);
    }

    #[test]
    fn alternate_column_scorer_override_applies() {
        let mut config = dictated_config(&[]);
        config.scorers_mut().register("always", |_, _| 100.0);
        config.alias_column("a", ["alt"]).unwrap();
        config.threshold_for("a", 90.0).unwrap();
        config.scorer_for("alt", "always");
        let reference = Records::from([(0, row(&[("a", "10"), ("alt", "5")]))]);

        let result = run(&config, &source_one(), &reference).unwrap();
        let c = &result.classifications[&0];
        assert_eq!(c.outcome, MatchOutcome::Matched);
        assert_eq!(c.field_scores["a"], 100.0);
    }

    #[test]
    fn alternate_column_threshold_override_applies() {
        let mut config = dictated_config(&[]);
        config.alias_column("a", ["alt"]).unwrap();
        config.threshold_for("a", 90.0).unwrap();
        let reference = Records::from([(0, row(&[("a", "10"), ("alt", "95")]))]);
        assert_eq!(
            run(&config, &source_one(), &reference).unwrap().classifications[&0].outcome,
            MatchOutcome::Matched
        );

        config.threshold_for("alt", 99.0).unwrap();
        assert_eq!(
            run(&config, &source_one(), &reference).unwrap().classifications[&0].outcome,
            MatchOutcome::Unmatched
        );
    }

    #[test]
    fn unknown_alternate_scorer_fails_before_any_record() {
        let mut config = dictated_config(&[]);
        config.alias_column("a", ["alt"]).unwrap();
        config.scorer_for("alt", "PTRatio");
        let err = run(&config, &source_one(), &Records::new()).unwrap_err();
        assert_eq!(
            err,
            MatchError::UnknownScorer { column: "alt".into(), scorer: "PTRatio".into() }
        );
    }

    #[test]
    fn empty_pool_is_no_candidates() {
        let mut config = dictated_config(&["a"]);
        config.block_on("state");
        let source = Records::from([(0, row(&[("a", "x"), ("state", "OH")]))]);
        let reference = Records::from([(0, row(&[("a", "100"), ("state", "PA")]))]);
        let result = run(&config, &source, &reference).unwrap();
        assert_eq!(result.classifications[&0], Classification::without_candidates());
    }

    #[test]
    fn unknown_scorer_fails_before_any_record() {
        let mut config = dictated_config(&["a"]);
        config.scorer_for("a", "missing");
        let mut seen = 0;
        let mut observer = |_: &RecordReport<'_>| seen += 1;
        let err = run_with_observer(&config, &source_one(), &Records::new(), &mut observer).unwrap_err();
        assert!(matches!(err, MatchError::UnknownScorer { .. }));
        assert_eq!(seen, 0);
    }

    #[test]
    fn panicking_observer_does_not_stop_the_run() {
        struct Exploding {
            calls: usize,
        }
        impl MatchObserver for Exploding {
            fn record_done(&mut self, _report: &RecordReport<'_>) {
                self.calls += 1;
                panic!("observer failure");
            }
        }

        let config = dictated_config(&["a"]);
        let source = Records::from([
            (0, row(&[("a", "x")])),
            (1, row(&[("a", "y")])),
        ]);
        let reference = Records::from([(0, row(&[("a", "100")]))]);
        let mut observer = Exploding { calls: 0 };
        let result = run_with_observer(&config, &source, &reference, &mut observer).unwrap();

        assert_eq!(observer.calls, 1);
        assert_eq!(result.diagnostics.count(MatchOutcome::Matched), 2);
        assert_eq!(result.records.len(), 2);
    }

    #[test]
    fn observer_sees_every_record_in_order() {
        let config = dictated_config(&["a"]);
        let source = Records::from([
            (5, row(&[("a", "x")])),
            (2, row(&[("a", "y")])),
        ]);
        let reference = Records::from([(0, row(&[("a", "100")]))]);
        let mut seen = Vec::new();
        let mut observer = |r: &RecordReport<'_>| seen.push((r.position, r.source_index, r.total));
        run_with_observer(&config, &source, &reference, &mut observer).unwrap();
        assert_eq!(seen, vec![(0, 2, 2), (1, 5, 2)]);
    }
}
