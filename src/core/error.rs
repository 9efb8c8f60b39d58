//! Error type shared across the crate.
//!
//! One structured error with a stable machine-readable code, a human
//! message, and an optional JSON detail payload. Codes are dotted strings
//! grouped by origin: `config.*` (project file problems, reported before
//! any step runs), `step.*` (fatal step outcomes), `collab.*` (external
//! tool/HTTP failures), `internal.*` (I/O and serialization).

use std::fmt;

use serde::Serialize;
use serde_json::{json, Value};

pub type Result<T> = std::result::Result<T, Error>;

// === Error codes ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    ConfigNotFound,
    ConfigBadFormat,
    ConfigInvalidSchema,
    ConfigMissingKey,
    ConfigInvalidValue,
    ConfigUnknownVersionService,
    StepUnknownHandler,
    StepDuplicatePublish,
    StepRemoteFileNotFound,
    StepUnknownObject,
    CommandFailed,
    HttpError,
    InternalIoError,
    InternalYamlError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigNotFound => "config.not_found",
            ErrorCode::ConfigBadFormat => "config.bad_format",
            ErrorCode::ConfigInvalidSchema => "config.invalid_schema",
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigUnknownVersionService => "config.unknown_version_service",
            ErrorCode::StepUnknownHandler => "step.unknown_handler",
            ErrorCode::StepDuplicatePublish => "step.duplicate_publish",
            ErrorCode::StepRemoteFileNotFound => "step.remote_file_not_found",
            ErrorCode::StepUnknownObject => "step.unknown_object",
            ErrorCode::CommandFailed => "collab.command_failed",
            ErrorCode::HttpError => "collab.http_error",
            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalYamlError => "internal.yaml_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Error ===

#[derive(Debug, Clone, Serialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    // === Configuration ===

    pub fn config_not_found(path: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {path}"),
            json!({ "path": path.to_string() }),
        )
    }

    pub fn config_bad_format(path: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConfigBadFormat,
            format!("Unable to parse configuration file {path}: {reason}"),
            json!({ "path": path.to_string() }),
        )
    }

    pub fn config_invalid_schema(found: i64, supported: &[i64]) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidSchema,
            format!("Unsupported configuration schema {found}, supported: {supported:?}"),
            json!({ "found": found, "supported": supported }),
        )
    }

    pub fn config_missing_key(section: &str, key: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("No value configured for {section}.{key}"),
            json!({ "section": section, "key": key }),
        )
    }

    pub fn config_invalid_value(field: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for {field}: {reason}"),
            json!({ "field": field }),
        )
    }

    pub fn unknown_version_service(service_type: &str) -> Self {
        Self::new(
            ErrorCode::ConfigUnknownVersionService,
            format!("Unknown version service type: {service_type}"),
            json!({ "type": service_type }),
        )
    }

    // === Steps ===

    pub fn unknown_handler(phase: &str, step_type: &str) -> Self {
        Self::new(
            ErrorCode::StepUnknownHandler,
            format!("No {phase} handler registered for step type '{step_type}'"),
            json!({ "phase": phase, "type": step_type }),
        )
    }

    pub fn duplicate_publish(name: &str) -> Self {
        Self::new(
            ErrorCode::StepDuplicatePublish,
            format!("Published artifact already exists: {name}"),
            json!({ "name": name }),
        )
    }

    pub fn remote_file_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::StepRemoteFileNotFound,
            format!("Remote file not found: {name}"),
            json!({ "name": name }),
        )
    }

    pub fn unknown_object(kind: &str, name: &str) -> Self {
        Self::new(
            ErrorCode::StepUnknownObject,
            format!("Unknown {kind}: {name}"),
            json!({ "kind": kind, "name": name }),
        )
    }

    // === Collaborators ===

    pub fn command_failed(context: &str, output: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CommandFailed,
            format!("{context} failed: {output}"),
            json!({ "context": context }),
        )
    }

    pub fn http_error(context: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::HttpError,
            format!("{context}: {reason}"),
            json!({ "context": context }),
        )
    }

    // === Internal ===

    pub fn internal_io(message: impl Into<String>, operation: Option<String>) -> Self {
        let message = message.into();
        let details = match operation {
            Some(op) => json!({ "operation": op }),
            None => Value::Null,
        };
        Self::new(ErrorCode::InternalIoError, message, details)
    }

    pub fn yaml(context: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InternalYamlError,
            format!("{context}: {reason}"),
            Value::Null,
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::internal_io(err.to_string(), None)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::http_error("HTTP request failed", err)
    }
}

/// Map an error to the process exit code reported at the CLI boundary.
///
/// Configuration problems exit 2 (usage-class), step and collaborator
/// failures exit 20, internal errors exit 1.
pub fn exit_code_for_error(err: &Error) -> i32 {
    match err.code {
        ErrorCode::ConfigNotFound
        | ErrorCode::ConfigBadFormat
        | ErrorCode::ConfigInvalidSchema
        | ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ConfigUnknownVersionService => 2,
        ErrorCode::StepUnknownHandler
        | ErrorCode::StepDuplicatePublish
        | ErrorCode::StepRemoteFileNotFound
        | ErrorCode::StepUnknownObject
        | ErrorCode::CommandFailed
        | ErrorCode::HttpError => 20,
        ErrorCode::InternalIoError | ErrorCode::InternalYamlError => 1,
    }
}

// === Recoverable errors ===

/// Failures a caller may deliberately tolerate. Each member carries its own
/// matching rule; nothing is tolerated implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverableError {
    /// The chart repo already holds this chart version. Helm surfaces the
    /// registry conflict as an `Error: 409` line on stderr.
    ChartVersionExists,
}

impl RecoverableError {
    pub fn matches(&self, err: &Error) -> bool {
        match self {
            RecoverableError::ChartVersionExists => {
                err.code == ErrorCode::CommandFailed && err.message.contains("Error: 409")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_dotted_strings() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "config.not_found");
        assert_eq!(ErrorCode::StepUnknownHandler.as_str(), "step.unknown_handler");
        assert_eq!(ErrorCode::CommandFailed.as_str(), "collab.command_failed");
        assert_eq!(ErrorCode::InternalIoError.as_str(), "internal.io_error");
    }

    #[test]
    fn display_includes_code() {
        let err = Error::config_missing_key("project", "version");
        let text = err.to_string();
        assert!(text.contains("project.version"));
        assert!(text.contains("config.missing_key"));
    }

    #[test]
    fn exit_codes_group_by_origin() {
        assert_eq!(exit_code_for_error(&Error::config_not_found("vjer.yml")), 2);
        assert_eq!(exit_code_for_error(&Error::duplicate_publish("a.zip")), 20);
        assert_eq!(
            exit_code_for_error(&Error::command_failed("helm push", "boom")),
            20
        );
        assert_eq!(exit_code_for_error(&Error::internal_io("io", None)), 1);
    }

    #[test]
    fn chart_conflict_matches_409_signature_only() {
        let conflict = Error::command_failed("helm push", "Error: 409: conflict");
        let other = Error::command_failed("helm push", "connection refused");
        assert!(RecoverableError::ChartVersionExists.matches(&conflict));
        assert!(!RecoverableError::ChartVersionExists.matches(&other));
        // Same text under a different code is not a chart conflict.
        let http = Error::http_error("push", "Error: 409");
        assert!(!RecoverableError::ChartVersionExists.matches(&http));
    }
}
