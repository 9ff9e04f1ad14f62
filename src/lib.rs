use crate::store::PostId;

pub mod config;
pub mod error_log;
pub mod fetch;
pub mod importer;
pub mod progress;
pub mod record;
pub mod store;

#[cfg(test)]
mod tests;

pub use error_log::ErrorLog;
pub use importer::Importer;
pub use record::{ImportRecord, TermList};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("{context}: {detail}")]
pub struct Error {
    pub context: Box<ErrorContext>,
    pub detail: Box<ErrorDetail>,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub title: String,
    pub id: Option<PostId>,
}

impl ErrorContext {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            id: None,
        }
    }

    fn with_id(&self, id: PostId) -> Self {
        Self {
            title: self.title.clone(),
            id: Some(id),
        }
    }

    fn error(&self, detail: ErrorDetail) -> Error {
        Error {
            context: Box::new(self.clone()),
            detail: Box::new(detail),
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{id}({:?})", self.title),
            None => write!(f, "{:?}", self.title),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorDetail {
    #[error("Failed to look up existing post: {0}")]
    FindPost(StoreError),
    #[error("Failed to insert post: {0}")]
    InsertPost(StoreError),
    #[error("Failed to update post: {0}")]
    UpdatePost(StoreError),
    #[error("Failed to resolve category {name:?}: {error}")]
    ResolveCategory { name: String, error: StoreError },
    #[error("Failed to resolve term {name:?} in {taxonomy}: {error}")]
    ResolveTerm {
        name: String,
        taxonomy: String,
        error: StoreError,
    },
}
