use thiserror::Error;

use calyx_rfc::rfc::ical::expand::ConversionError;

/// Service layer errors - combines all error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    RfcError(#[from] calyx_rfc::error::RfcError),

    #[error(transparent)]
    CoreError(#[from] calyx_core::error::CoreError),

    #[error("Cannot resolve timezone {tzid:?}: {source}")]
    TimezoneResolutionFailure {
        tzid: String,
        #[source]
        source: ConversionError,
    },

    #[error("Recurring event {uid:?} produces no instances")]
    NoInstancesForRecurringEvent { uid: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ServiceError {
    pub(crate) fn timezone(tzid: &str, source: ConversionError) -> Self {
        Self::TimezoneResolutionFailure {
            tzid: tzid.to_string(),
            source,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
