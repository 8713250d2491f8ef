use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller role as forwarded by the gateway in `X-User-Role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum Role {
    Admin,
    Teacher,
    Student,
    /// Anything the gateway sent that we do not recognise.
    Unknown,
}

impl Role {
    pub(crate) fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Self::Admin,
            "TEACHER" => Self::Teacher,
            "STUDENT" => Self::Student,
            _ => Self::Unknown,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Teacher => "TEACHER",
            Self::Student => "STUDENT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Type tag of a scheduled exam. Stored as free text; unrecognised tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub(crate) enum ExamType {
    Exam,
    Practice,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetakePolicy {
    /// At most one submitted attempt per student.
    SingleSubmission,
    /// Any number of submitted attempts, one in progress at a time.
    Repeatable,
}

impl ExamType {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Exam => "EXAM",
            Self::Practice => "PRACTICE",
            Self::Other(tag) => tag,
        }
    }

    pub(crate) fn retake_policy(&self) -> RetakePolicy {
        match self {
            Self::Practice => RetakePolicy::Repeatable,
            // Unknown tags get the strict policy until they are given one explicitly.
            Self::Exam | Self::Other(_) => RetakePolicy::SingleSubmission,
        }
    }
}

impl From<String> for ExamType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "EXAM" => Self::Exam,
            "PRACTICE" => Self::Practice,
            _ => Self::Other(value),
        }
    }
}

impl From<ExamType> for String {
    fn from(value: ExamType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
