use thiserror::Error;

/// Document-level failures. Missing metadata and unmatched categories are not errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("document has no pages")]
    EmptyDocument,

    #[error("page sequence broken at position {position}: expected page {expected}, found page {found}")]
    PageSequence {
        position: usize,
        expected: u32,
        found: u32,
    },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),
}
