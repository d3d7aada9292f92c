//! Shared primitives for all Rust crates in Querylens.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Querylens crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Configuration(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// User-facing query validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The query option is not in the allow-list.
    #[error("query option '{option}' is not allowed")]
    QueryOptionNotAllowed {
        /// Query option name, e.g. `$filter`.
        option: String,
    },

    /// A numeric or structural limit was exceeded.
    #[error(
        "the limit of '{limit}' for {option} query has been exceeded; the value from the incoming request is '{value}'"
    )]
    LimitExceeded {
        /// Query option or setting that carries the limit.
        option: String,
        /// Configured limit.
        limit: u64,
        /// Offending request value.
        value: u64,
    },

    /// A model restriction forbids using the property with the option.
    #[error("the property '{property}' cannot be used in the {option} query option")]
    PropertyRestricted {
        /// Offending property name.
        property: String,
        /// Query option name.
        option: String,
    },

    /// A clause references a property the current shape does not have.
    #[error("could not find a property named '{property}' on type '{type_name}'")]
    UnknownProperty {
        /// Unresolved property name.
        property: String,
        /// Type or shape the property was looked up on.
        type_name: String,
    },

    /// Any other invalid query construct.
    #[error("{0}")]
    Invalid(String),
}

impl ValidationError {
    /// Creates a generic invalid-query error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Common application error categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Missing or empty required argument, or a broken model/collaborator contract.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query input rejected by validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Valid input that the environment cannot satisfy.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Internal unexpected error, including binding invariant violations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether this error was caused by the incoming query itself.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the structured validation error, if any.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString, ValidationError};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("   ");
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn limit_exceeded_reports_limit_and_value() {
        let error = AppError::from(ValidationError::LimitExceeded {
            option: "$top".to_owned(),
            limit: 50,
            value: 100,
        });

        let message = error.to_string();
        assert!(message.contains("'50'"));
        assert!(message.contains("'100'"));
        assert!(error.is_user_error());
    }
}
