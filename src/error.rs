use thiserror::Error;

use crate::ledger::SequenceId;

/// Failure compiling or running one of the user supplied patterns
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern {pattern:?}: {source}")]
    Syntax {
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },
    #[error("pattern {pattern:?} failed while scanning: {source}")]
    Match {
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },
}

/// Failure talking to the keystroke ledger or the text store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("keystroke {number} for sequence {sequence} is not after {last}")]
    OutOfOrder {
        sequence: SequenceId,
        number: u32,
        last: u32,
    },
    #[error("sequence {0} does not exist")]
    UnknownSequence(SequenceId),
    #[error("text {0} does not exist")]
    UnknownText(i64),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
