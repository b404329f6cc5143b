//! RFC 5545 value types used by the calyx recurrence engine.

pub mod error;
pub mod rfc;
