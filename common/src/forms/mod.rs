//! Upload forms: static field tables and submission validation.

pub mod catalog;
pub mod field;
pub mod validate;

pub use catalog::{FormCatalog, FormKind, FormSchema, FormSummary, FormView};
pub use field::{Choice, FieldKind, FieldSpec, FieldValue, Validator};
pub use validate::{FormSubmission, UploadedFile, ValidatedUpload};
