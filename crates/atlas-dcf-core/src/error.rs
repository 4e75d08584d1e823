use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    /// One entry per violated invariant, gathered in a single validation pass.
    #[error("Invalid configuration: {}", .violations.join("; "))]
    Configuration { violations: Vec<String> },

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AtlasError {
    /// Configuration error carrying a single violation.
    pub fn configuration(violation: impl Into<String>) -> Self {
        AtlasError::Configuration {
            violations: vec![violation.into()],
        }
    }

    /// Arithmetic left the 96-bit decimal range. Reported as a configuration
    /// problem because only extreme inputs (horizon, scale, spreads) reach it.
    pub fn overflow(context: impl std::fmt::Display) -> Self {
        AtlasError::configuration(format!(
            "{context} overflows the decimal range; reduce the horizon, growth or scale"
        ))
    }

    /// Human-readable problems, one per line item, for display by a caller.
    pub fn violations(&self) -> Vec<String> {
        match self {
            AtlasError::Configuration { violations } => violations.clone(),
            other => vec![other.to_string()],
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AtlasError::Configuration { .. })
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(e: serde_json::Error) -> Self {
        AtlasError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display_lists_every_violation() {
        let err = AtlasError::Configuration {
            violations: vec!["stage 1: bad".into(), "wacc: bad".into()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: stage 1: bad; wacc: bad"
        );
        assert_eq!(err.violations().len(), 2);
        assert!(err.is_configuration());
    }

    #[test]
    fn test_overflow_is_configuration() {
        let err = AtlasError::overflow("year 97 revenue");
        assert!(err.is_configuration());
        assert!(err.violations()[0].starts_with("year 97 revenue overflows"));
    }

    #[test]
    fn test_non_configuration_violations_single_entry() {
        let err = AtlasError::InvalidInput {
            field: "shares_outstanding".into(),
            reason: "must be positive".into(),
        };
        assert_eq!(err.violations().len(), 1);
        assert!(!err.is_configuration());
    }
}
