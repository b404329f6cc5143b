//! Recurrence engine: range, expansion, reconciliation and override resolution.

pub mod basis;
mod exclusion;
pub mod expand;
pub mod generator;
pub mod incremental;
pub mod range;
pub mod reconcile;
pub mod resolve;

pub use basis::{RecurrenceIdForm, TimeBasis};
pub use expand::{Expansion, ExpansionWindow, expand};
pub use incremental::{ChangeScope, incremental_periods};
pub use range::compute_range;
pub use reconcile::{InvalidOverride, InvalidOverrideReason, Reconciliation, reconcile};
pub use resolve::{resolve, resolve_instance};
