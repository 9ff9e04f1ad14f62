use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::record::Post;

pub mod debug;
pub mod sqlite;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(PostId);
id_type!(CategoryId);
id_type!(TermId);
id_type!(MediaId);

/// The content platform the importer writes into.
///
/// Every call is awaited to completion before the next one is issued.
pub trait ContentStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Exact title match within one content type.
    fn find_by_title(
        &self,
        title: &str,
        post_type: &str,
    ) -> impl Future<Output = Result<Option<PostId>, Self::Error>>;

    fn insert(&self, post: &Post) -> impl Future<Output = Result<PostId, Self::Error>>;

    /// `post.id` is always set.
    fn update(&self, post: &Post) -> impl Future<Output = Result<PostId, Self::Error>>;

    /// Returns `false` when the store refused the assignment.
    fn set_cover_image(
        &self,
        post: PostId,
        media: MediaId,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    fn upsert_meta(
        &self,
        post: PostId,
        key: &str,
        value: &serde_json::Value,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn find_category(&self, name: &str)
    -> impl Future<Output = Result<Option<CategoryId>, Self::Error>>;

    fn create_category(&self, name: &str) -> impl Future<Output = Result<CategoryId, Self::Error>>;

    fn find_term(
        &self,
        name: &str,
        taxonomy: &str,
    ) -> impl Future<Output = Result<Option<TermId>, Self::Error>>;

    fn create_term(
        &self,
        name: &str,
        taxonomy: &str,
    ) -> impl Future<Output = Result<TermId, Self::Error>>;

    /// Looks up a media attachment by its display name.
    fn find_attachment(&self, name: &str)
    -> impl Future<Output = Result<Option<MediaId>, Self::Error>>;

    /// Downloads or copies `source` to a temporary file owned by the caller.
    fn fetch_to_temp(&self, source: &str) -> impl Future<Output = Result<PathBuf, Self::Error>>;

    /// Moves a fetched file into permanent storage, attached to `post`.
    fn sideload(
        &self,
        temp: &Path,
        name: &str,
        post: PostId,
    ) -> impl Future<Output = Result<MediaId, Self::Error>>;
}
