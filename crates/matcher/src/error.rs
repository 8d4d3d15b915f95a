use std::fmt;

/// Structural configuration errors. Raised before any record is processed;
/// data-quality outcomes are never reported through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchError {
    /// A scored column references a scorer name missing from the registry.
    UnknownScorer { column: String, scorer: String },
    /// A column is configured both as a blocking key and as a scored column.
    BlockedAndScored { column: String },
    /// A projection names a column absent from the reference schema.
    UnknownProjectionColumn { column: String },
    /// Threshold outside 0–100 (or negative / non-finite duplicate tolerance).
    InvalidThreshold { column: String, value: f64 },
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownScorer { column, scorer } => {
                write!(f, "column '{column}': unknown scorer '{scorer}'")
            }
            Self::BlockedAndScored { column } => {
                write!(f, "column '{column}' cannot be both a blocking key and a scored column")
            }
            Self::UnknownProjectionColumn { column } => {
                write!(f, "projection references unknown reference column '{column}'")
            }
            Self::InvalidThreshold { column, value } => {
                write!(f, "'{column}': invalid threshold {value}")
            }
        }
    }
}

impl std::error::Error for MatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_column() {
        let err = MatchError::UnknownScorer {
            column: "lastname".into(),
            scorer: "WRatio".into(),
        };
        assert_eq!(err.to_string(), "column 'lastname': unknown scorer 'WRatio'");

        let err = MatchError::BlockedAndScored { column: "state_id".into() };
        assert!(err.to_string().contains("'state_id'"));
    }
}
