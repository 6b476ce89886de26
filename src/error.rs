//! Error types.
//!
//! - `FitError` is what the fitting engine returns. Its variants follow the
//!   failure modes of a drop-shape fit (domain, cancellation, numerics, bad
//!   input).
//! - `AppError` is the binary-facing error: a message plus the process exit code.

use thiserror::Error;

/// Failure of a fitting-engine operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// The theoretical profile was queried outside its domain (negative arc length).
    #[error("arc length outside profile domain: s = {s}")]
    Domain { s: f64 },

    /// A cooperative cancellation request was observed.
    #[error("fit cancelled")]
    Cancelled,

    /// Singular normal equations, non-finite intermediate values, failed integration.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Caller-supplied data or constants are unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl FitError {
    pub fn numerical(message: impl Into<String>) -> Self {
        FitError::Numerical(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        FitError::InvalidInput(message.into())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let code = match err {
            FitError::InvalidInput(_) => 2,
            FitError::Domain { .. } | FitError::Numerical(_) => 4,
            FitError::Cancelled => 130,
        };
        AppError::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_map_to_exit_codes() {
        assert_eq!(AppError::from(FitError::invalid("x")).exit_code(), 2);
        assert_eq!(AppError::from(FitError::Domain { s: -1.0 }).exit_code(), 4);
        assert_eq!(AppError::from(FitError::Cancelled).exit_code(), 130);
        assert_eq!(AppError::from(FitError::numerical("singular")).exit_code(), 4);
    }
}
