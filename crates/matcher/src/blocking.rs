//! Blocking index: partitions reference records by exact blocking-key value.
//!
//! Keys compare after case folding and whitespace normalization only; there is
//! no fuzzy comparison here. A misspelled group value finds no candidates.

use std::collections::BTreeMap;

use crate::model::{field, Record, Records};
use crate::similarity::normalize;

/// Normalized blocking-column values, in blocking-column order.
/// Empty when no blocking columns are configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(Vec<String>);

impl BlockKey {
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(values.into_iter().map(|v| normalize(v.as_ref())).collect())
    }
}

#[derive(Debug, Clone)]
pub struct BlockingIndex {
    columns: Vec<String>,
    partitions: BTreeMap<BlockKey, Vec<usize>>,
}

impl BlockingIndex {
    /// Group reference row indexes by block key. With no blocking columns the
    /// whole reference set lands in a single partition.
    pub fn build(columns: &[String], reference: &Records) -> Self {
        let mut index = Self {
            columns: columns.to_vec(),
            partitions: BTreeMap::new(),
        };
        for (row_index, row) in reference {
            let key = index.key_for(row);
            index.partitions.entry(key).or_default().push(*row_index);
        }
        index
    }

    pub fn key_for(&self, record: &Record) -> BlockKey {
        BlockKey::from_values(self.columns.iter().map(|c| field(record, c)))
    }

    /// Reference row indexes sharing `key`, in index order.
    pub fn lookup(&self, key: &BlockKey) -> &[usize] {
        self.partitions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn candidates_for(&self, record: &Record) -> &[usize] {
        self.lookup(&self.key_for(record))
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn reference() -> Records {
        let mut records = Records::new();
        records.insert(0, row(&[("state_id", "OH"), ("office", "House")]));
        records.insert(1, row(&[("state_id", "PA"), ("office", "House")]));
        records.insert(2, row(&[("state_id", " oh "), ("office", "Senate")]));
        records.insert(3, row(&[("office", "House")]));
        records
    }

    #[test]
    fn no_columns_means_one_partition() {
        let index = BlockingIndex::build(&[], &reference());
        assert_eq!(index.partition_count(), 1);
        assert_eq!(index.candidates_for(&row(&[("state_id", "ZZ")])), &[0, 1, 2, 3]);
    }

    #[test]
    fn single_column_normalizes_case_and_whitespace() {
        let index = BlockingIndex::build(&["state_id".to_string()], &reference());
        assert_eq!(index.candidates_for(&row(&[("state_id", "Oh")])), &[0, 2]);
        assert_eq!(index.candidates_for(&row(&[("state_id", "PA")])), &[1]);
    }

    #[test]
    fn misspelled_value_finds_nothing() {
        let index = BlockingIndex::build(&["state_id".to_string()], &reference());
        assert!(index.candidates_for(&row(&[("state_id", "OHH")])).is_empty());
    }

    #[test]
    fn composite_key_is_conjunctive() {
        let columns = vec!["state_id".to_string(), "office".to_string()];
        let index = BlockingIndex::build(&columns, &reference());
        assert_eq!(
            index.candidates_for(&row(&[("state_id", "OH"), ("office", "house")])),
            &[0]
        );
        assert_eq!(
            index.lookup(&BlockKey::from_values(["oh", "SENATE"])),
            &[2]
        );
    }

    #[test]
    fn missing_block_value_groups_with_blanks() {
        let index = BlockingIndex::build(&["state_id".to_string()], &reference());
        assert_eq!(index.candidates_for(&row(&[("office", "House")])), &[3]);
    }
}
