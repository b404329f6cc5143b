//! Shared configuration and error types for the calyx recurrence engine.

pub mod config;
pub mod error;
