pub mod model;
pub mod notify;
pub mod recurrence;
pub mod service;
pub mod store;
