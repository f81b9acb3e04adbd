use thiserror::Error;

/// Errors surfaced by the shared data model (validation of newtypes, enum
/// parsing). Storage and I/O errors live in `biblio-core::error::LibraryError`.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
