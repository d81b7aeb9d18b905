//! Data layer: schemas, sources, row validation, splitting and ingestion.

pub mod ingestion;
pub mod schema;
pub mod source;
pub mod split;
pub mod validate;

pub use ingestion::DataIngestion;
pub use schema::{Family, FamilySchema, RawRecord, RawValue, TaskType};
pub use source::{CsvSource, DataBatch, DataSource};
pub use split::Split;
pub use validate::ValidationReport;
