//! Process-level error.
//!
//! Anything that ends the run early surfaces as an [`AppError`]. Per-series
//! and per-branch failures never do; the harvester logs and counts them.

use thiserror::Error;

/// Broad cause of a fatal error; decides the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments, bad configuration, or a missing credential.
    Config,
    /// The output root cannot be created or used.
    Storage,
    /// HTTP client, logging, or signal handler setup failed.
    Setup,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Config => 2,
            ErrorKind::Storage => 3,
            ErrorKind::Setup => 4,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Setup, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::config("x").exit_code(), 2);
        assert_eq!(AppError::storage("x").exit_code(), 3);
        assert_eq!(AppError::setup("x").exit_code(), 4);
    }

    #[test]
    fn display_is_the_message() {
        let err = AppError::config("Missing EVDS_API_KEY in environment (.env).");
        assert_eq!(err.to_string(), "Missing EVDS_API_KEY in environment (.env).");
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
