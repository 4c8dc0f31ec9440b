use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Closed set of error codes for client-side translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Student data validation
    EmptyStudentData,
    MissingRequiredFields,
    DuplicateStudentNames,

    // Friendship validation
    StudentNoFriends,
    UnknownFriend,
    IsolatedStudents,

    // Assignment parameter validation
    InvalidClassCount,
    InvalidStudentCount,
    TooManyClasses,
    ClassSizeTooSmall,

    // Assignment execution
    AssignmentFailed,
    NoSolutionFound,
    OptimizationTimeout,

    // System
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyStudentData => "EMPTY_STUDENT_DATA",
            ErrorCode::MissingRequiredFields => "MISSING_REQUIRED_FIELDS",
            ErrorCode::DuplicateStudentNames => "DUPLICATE_STUDENT_NAMES",
            ErrorCode::StudentNoFriends => "STUDENT_NO_FRIENDS",
            ErrorCode::UnknownFriend => "UNKNOWN_FRIEND",
            ErrorCode::IsolatedStudents => "ISOLATED_STUDENTS",
            ErrorCode::InvalidClassCount => "INVALID_CLASS_COUNT",
            ErrorCode::InvalidStudentCount => "INVALID_STUDENT_COUNT",
            ErrorCode::TooManyClasses => "TOO_MANY_CLASSES",
            ErrorCode::ClassSizeTooSmall => "CLASS_SIZE_TOO_SMALL",
            ErrorCode::AssignmentFailed => "ASSIGNMENT_FAILED",
            ErrorCode::NoSolutionFound => "NO_SOLUTION_FOUND",
            ErrorCode::OptimizationTimeout => "OPTIMIZATION_TIMEOUT",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether this code denotes a precondition failure (as opposed to a
    /// solver or system failure).
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            ErrorCode::AssignmentFailed
                | ErrorCode::NoSolutionFound
                | ErrorCode::OptimizationTimeout
                | ErrorCode::InternalServerError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured engine error: a translatable code, named parameters for the
/// client-side message template, and an English debug message.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code}: {message}")]
pub struct EngineError {
    pub code: ErrorCode,
    pub params: Map<String, Value>,
    pub message: String,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        EngineError {
            code,
            params: Map::new(),
            message: message.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        EngineError::new(ErrorCode::InternalServerError, message.clone())
            .with_param("details", message)
    }

    /// Wire envelope: `{ "error": { "code", "params", "message" } }`.
    pub fn to_envelope(&self) -> Value {
        json!({
            "error": {
                "code": self.code,
                "params": &self.params,
                "message": &self.message,
            }
        })
    }
}
