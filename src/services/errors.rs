use thiserror::Error;

use crate::store::StoreError;

/// Failures of exam-session operations. Each maps to one caller-visible error kind.
#[derive(Debug, Error)]
pub(crate) enum ExamError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("Exam is not open")]
    NotOpen,
    #[error("{0}")]
    OutsideWindow(&'static str),
    #[error("Attempt has already been submitted")]
    AlreadySubmitted,
    #[error("{0}")]
    InvalidDefinition(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExamError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::NotOpen => "not_open",
            Self::OutsideWindow(_) => "outside_window",
            Self::AlreadySubmitted => "already_submitted",
            Self::InvalidDefinition(_) => "invalid_definition",
            Self::Invalid(_) => "invalid",
            Self::Store(_) => "store",
        }
    }
}
