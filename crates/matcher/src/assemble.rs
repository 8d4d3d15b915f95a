//! Result assembly. Merges accepted candidates' projected columns into the
//! source rows and counts outcomes.

use std::collections::BTreeMap;

use crate::model::{field, Classification, MatchDiagnostics, MatchOutcome, Records};

/// Build the output rows and diagnostics.
///
/// Every source row is kept. MATCHED rows get each projected reference column
/// under its output key; every other row gets the output keys with blank
/// values (an existing source value under the same key is left alone).
pub fn assemble(
    source: &Records,
    reference: &Records,
    classifications: &BTreeMap<usize, Classification>,
    projection: &BTreeMap<String, String>,
) -> (Records, MatchDiagnostics) {
    let mut diagnostics = MatchDiagnostics::new();
    let mut output = Records::new();

    for (index, row) in source {
        let mut merged = row.clone();
        let classification = classifications.get(index);
        if let Some(c) = classification {
            diagnostics.record(c.outcome);
        }

        let accepted = classification
            .filter(|c| c.outcome == MatchOutcome::Matched)
            .and_then(|c| c.reference_index)
            .and_then(|ri| reference.get(&ri));

        for (reference_column, output_key) in projection {
            match accepted {
                Some(candidate) => {
                    merged.insert(
                        output_key.clone(),
                        field(candidate, reference_column).to_string(),
                    );
                }
                None => {
                    merged.entry(output_key.clone()).or_default();
                }
            }
        }

        output.insert(*index, merged);
    }

    (output, diagnostics)
}
