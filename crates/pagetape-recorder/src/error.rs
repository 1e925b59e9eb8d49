//! Structured errors shared across the recording engine

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SerializationFailed,
    ObserverInstallFailed,
    EmitFailed,
    InvalidConfig,
    RecorderBusy,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn serialization_failed(what: &str) -> Self {
        Self::new(
            ErrorCode::SerializationFailed,
            format!("Failed to serialize {}", what),
        )
    }

    pub fn observer_install_failed(observer: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::ObserverInstallFailed,
            format!("Could not install {} observer: {}", observer, reason),
        )
    }

    pub fn emit_failed(reason: &str) -> Self {
        Self::new(ErrorCode::EmitFailed, format!("Sink failed: {}", reason))
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, reason)
    }

    pub fn recorder_busy() -> Self {
        Self::new(
            ErrorCode::RecorderBusy,
            "A recording is already attached to this page",
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}
