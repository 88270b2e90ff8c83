pub mod client;
pub mod error;
pub mod model;

pub use client::{confirm, StudentRecordsApi};
pub use error::StudentRecordsError;
pub use model::*;
