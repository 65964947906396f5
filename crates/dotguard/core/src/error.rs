// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Error handling for the access-control core
//! Maps decisions onto RFC 7807 Problem Details for the request layer

use crate::workflow::{EntityType, TransitionDenial};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Guard error types
///
/// `Unauthorized` and `InvalidTransition` are pure decisions produced before
/// any mutation. A cache miss is not an error and never appears here.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid {entity} transition from {from} to {to}: {reason}")]
    InvalidTransition {
        entity: EntityType,
        from: String,
        to: String,
        reason: TransitionDenial,
    },

    #[error("Too many requests: {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GuardError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            GuardError::InvalidTransition { .. } => StatusCode::FORBIDDEN,
            GuardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GuardError::InvalidRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GuardError::SerdeJsonError(_) => StatusCode::BAD_REQUEST,
            GuardError::InvalidConfig { .. } | GuardError::TomlError(_) | GuardError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            GuardError::Unauthorized { .. } => "unauthorized",
            GuardError::InvalidTransition { .. } => "invalid_transition",
            GuardError::RateLimited { .. } => "rate_limited",
            GuardError::InvalidRecord { .. } => "invalid_record",
            GuardError::InvalidConfig { .. } => "invalid_config",
            GuardError::TomlError(_) => "toml_error",
            GuardError::SerdeJsonError(_) => "json_error",
            GuardError::IoError(_) => "io_error",
        }
    }

    /// Wait suggested to the client, only present for rate limit denials
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GuardError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        GuardError::Unauthorized { message: message.into() }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        GuardError::InvalidRecord { message: message.into() }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        GuardError::InvalidConfig { message: message.into() }
    }
}

/// RFC 7807 Problem Details response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type")]
    pub problem_type: String,

    /// A short, human-readable summary of the problem type
    pub title: String,

    /// The HTTP status code generated by the origin server
    pub status: u16,

    /// A human-readable explanation specific to this occurrence
    pub detail: String,

    /// A URI reference that identifies the specific occurrence
    pub instance: String,

    /// Additional extension members
    #[serde(flatten)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl ProblemDetails {
    /// Create a new problem details response
    pub fn new(error: &GuardError, instance: String) -> Self {
        let status_code = error.status_code();

        let details = Self {
            problem_type: format!("https://api.dotlanth.com/problems/{}", error.error_type()),
            title: status_code.canonical_reason().unwrap_or("Unknown Error").to_string(),
            status: status_code.as_u16(),
            detail: error.to_string(),
            instance,
            extensions: HashMap::new(),
        };

        // Clients back off using whole seconds, rounded up
        match error.retry_after() {
            Some(wait) => {
                let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                details.with_extension("retryAfter".to_string(), serde_json::Value::from(secs))
            }
            None => details,
        }
    }

    /// Add extension data to the problem details
    pub fn with_extension(mut self, key: String, value: serde_json::Value) -> Self {
        self.extensions.insert(key, value);
        self
    }
}

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleKind;
    use crate::workflow::EntityType;

    #[test]
    fn test_decision_errors_map_to_forbidden() {
        let unauthorized = GuardError::unauthorized("organization mismatch");
        assert_eq!(unauthorized.status_code(), StatusCode::FORBIDDEN);

        let transition = GuardError::InvalidTransition {
            entity: EntityType::Project,
            from: "pending".to_string(),
            to: "delivered".to_string(),
            reason: TransitionDenial::RoleNotPermitted { required: RoleKind::Approver },
        };
        assert_eq!(transition.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(transition.error_type(), "invalid_transition");
    }

    #[test]
    fn test_rate_limited_problem_details_carry_retry_after() {
        let error = GuardError::RateLimited {
            message: "bucket empty".to_string(),
            retry_after: Some(Duration::from_millis(11_200)),
        };
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let problem = ProblemDetails::new(&error, "/projects/42".to_string());
        assert_eq!(problem.status, 429);
        assert_eq!(problem.title, "Too Many Requests");
        assert_eq!(problem.extensions.get("retryAfter"), Some(&serde_json::Value::from(12u64)));
    }
}
