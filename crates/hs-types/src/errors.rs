use thiserror::Error;

/// Main error type for the HyperSweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Invalid search space for parameter {parameter}: {message}")]
    InvalidSpace { parameter: String, message: String },

    #[error("Batch size mismatch: expected {expected} entries, got {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("Insufficient evaluations: requested top {requested}, only {available} logged")]
    InsufficientEvaluations { requested: usize, available: usize },

    #[error("Pareto front too small: requested {requested}, front has {front_size} members")]
    ParetoFrontTooSmall { requested: usize, front_size: usize },

    #[error("Search space exhausted: {strategy} cannot produce another unique candidate")]
    SpaceExhausted { strategy: String },

    #[error("Objective mismatch: {0}")]
    ObjectiveMismatch(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HsError {
    /// Whether this error is the terminal "no more unique candidates" signal
    /// rather than a failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, HsError::SpaceExhausted { .. })
    }
}

/// Result type alias for HyperSweep operations
pub type HsResult<T> = Result<T, HsError>;

/// Macro for creating search space errors
#[macro_export]
macro_rules! space_error {
    ($param:expr, $($arg:tt)*) => {
        $crate::HsError::InvalidSpace {
            parameter: ($param).to_string(),
            message: format!($($arg)*),
        }
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::HsError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = HsError::InsufficientEvaluations {
            requested: 5,
            available: 2,
        };

        assert!(error.to_string().contains("Insufficient evaluations"));
        assert!(error.to_string().contains('5'));
        assert!(error.to_string().contains('2'));
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing archive");
        let hs_error: HsError = io.into();

        match hs_error {
            HsError::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_macros() {
        let space_err = space_error!("lrate", "begin {} > end {}", 2, 1);
        match space_err {
            HsError::InvalidSpace { parameter, message } => {
                assert_eq!(parameter, "lrate");
                assert_eq!(message, "begin 2 > end 1");
            }
            _ => panic!("Expected InvalidSpace error"),
        }
        let config_err = config_error!("Missing required field: {}", "strategy");
        assert!(config_err.to_string().contains("strategy"));
    }

    #[test]
    fn exhaustion_is_distinguishable() {
        let exhausted = HsError::SpaceExhausted {
            strategy: "grid".into(),
        };
        assert!(exhausted.is_exhausted());
        assert!(!HsError::Backend("boom".into()).is_exhausted());
    }
}
