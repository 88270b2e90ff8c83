//! CSV boundary: turns uploads into validated batches and renders exports.

pub mod export;
pub mod reader;

pub use export::{render_students, EXPORT_HEADER};
pub use reader::{parse_batch, CsvImportError};
