use thiserror::Error;

/// RFC value parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RfcError {
    #[error("Invalid {kind} value: {value:?}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("Malformed recurrence rule {rule:?}: {reason}")]
    MalformedRule { rule: String, reason: String },
}

impl RfcError {
    pub(crate) fn invalid(kind: &'static str, value: &str) -> Self {
        Self::InvalidValue {
            kind,
            value: value.to_string(),
        }
    }

    pub(crate) fn malformed(rule: &str, reason: impl Into<String>) -> Self {
        Self::MalformedRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

pub type RfcResult<T> = std::result::Result<T, RfcError>;
