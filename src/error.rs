use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreprocessError {
    #[error("parse error at byte {offset}: {message}")]
    Parse { message: String, offset: usize },

    #[error("conditional expression at byte {offset} has no literal branch within {depth} levels")]
    MalformedConditional { offset: usize, depth: usize },

    #[error("edit {second:?} overlaps edit {first:?}")]
    SpliceConflict {
        first: Range<usize>,
        second: Range<usize>,
    },

    #[error("edit offset {offset} is outside the source (length {len}) or not on a char boundary")]
    EditOutOfBounds { offset: usize, len: usize },
}
