use std::path::PathBuf;

use thiserror::Error;

use crate::ingest::IngestSummary;

/// A match file that could not be turned into a [`crate::record::MatchRecord`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid match json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema mismatch: {0}")]
    Schema(String),
}

/// Identity problems that make a whole match unloadable.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("ambiguous player name {name:?} in roster of {team:?}")]
    Ambiguous { team: String, name: String },

    #[error("player {name:?} of {team:?} has no registry entry")]
    Unregistered { team: String, name: String },

    #[error("delivery references {name:?}, who is not on either roster")]
    UnknownPlayer { name: String },

    #[error("team {name:?} was not resolved for this match")]
    UnknownTeam { name: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("match {match_id} already stored")]
    DuplicateMatch { match_id: i64 },

    #[error("player with source id {source_id:?} not found")]
    MissingPlayer { source_id: String },

    #[error("encode column {column}: {source}")]
    Encode {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Sqlite {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Attaches a short operation label to a `rusqlite` failure.
pub(crate) trait SqliteContext<T> {
    fn op(self, context: &'static str) -> StoreResult<T>;
}

impl<T> SqliteContext<T> for Result<T, rusqlite::Error> {
    fn op(self, context: &'static str) -> StoreResult<T> {
        self.map_err(|source| StoreError::Sqlite { context, source })
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("list match directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The run stopped on a fatal error; `summary` holds what was counted so far.
#[derive(Debug, Error)]
#[error("ingest halted after {} loaded matches: {error}", .summary.matches_loaded)]
pub struct RunHalted {
    pub summary: IngestSummary,
    #[source]
    pub error: IngestError,
}
