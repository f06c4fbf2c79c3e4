use sa_mappings::suffix_to_protein_index::MappingError;
use thiserror::Error;

/// Errors that occur while searching a single peptide
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("empty query")]
    EmptyQuery,

    #[error("invalid symbol {symbol:?} at position {position}")]
    InvalidSymbol { symbol: char, position: usize },

    #[error(transparent)]
    InvalidOffset(#[from] MappingError),
}

impl SearchError {
    /// Returns true if the other peptides of a batch can still be searched after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidOffset(_))
    }
}
