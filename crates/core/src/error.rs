//! Error taxonomy shared by the sources, the validator and the merger.

use thiserror::Error;

use crate::models::Source;

/// Reason a raw record could not be turned into a [`crate::models::Game`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid record{}: field `{field}` {reason}", record_label(.id))]
pub struct ValidationFailure {
    /// Identifier of the offending record, when it could be read.
    pub id: Option<i64>,
    /// Name of the first field that failed validation.
    pub field: String,
    /// Human readable reason.
    pub reason: String,
}

impl ValidationFailure {
    pub(crate) fn new(id: Option<i64>, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn record_label(id: &Option<i64>) -> String {
    match id {
        Some(id) => format!(" {id}"),
        None => String::new(),
    }
}

/// Errors surfaced by the catalog data layer.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// A record failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    /// The backing service could not be reached or answered with a failure status.
    #[error("{origin} source unavailable: {reason}")]
    SourceUnavailable {
        /// Which source failed.
        origin: Source,
        /// Transport or status description.
        reason: String,
    },
    /// A local record with the same id already exists.
    #[error("game {id} is already in the collection")]
    DuplicateRecord {
        /// Conflicting identifier.
        id: i64,
    },
    /// Local pagination ran out of records for the current context.
    #[error("no more games to load")]
    NotFoundExhausted,
    /// The local record addressed by an update does not exist.
    #[error("game {id} not found in the collection")]
    NotFound {
        /// Missing identifier.
        id: i64,
    },
}

impl CatalogError {
    pub(crate) fn unavailable(source: Source, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            origin: source,
            reason: reason.to_string(),
        }
    }

    /// Whether the error should be rendered as a banner next to the list.
    pub fn is_banner(&self) -> bool {
        !matches!(self, Self::NotFoundExhausted)
    }
}
