// === PUBLIC CONTRACT ===
pub mod contract;

pub use contract::{client, error, model};

// === MODULE DEFINITION ===
pub mod module;
pub use module::StudentRecords;

// === INTERNAL MODULES ===
// Exposed for the server binary and integration tests. Other modules should
// depend on `contract` only.
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod gateways;
#[doc(hidden)]
pub mod infra;

pub use config::StudentRecordsConfig;
