use std::{
    convert::Infallible,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::info;

use super::{CategoryId, ContentStore, MediaId, PostId, TermId};
use crate::record::Post;

/// Dry-run store: finds nothing, writes nothing, hands out increasing ids.
#[derive(Default)]
pub struct DebugStore {
    next_id: AtomicU64,
}

impl DebugStore {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl ContentStore for DebugStore {
    type Error = Infallible;

    async fn find_by_title(&self, _: &str, _: &str) -> Result<Option<PostId>, Self::Error> {
        Ok(None)
    }

    async fn insert(&self, post: &Post) -> Result<PostId, Self::Error> {
        let id = PostId(self.next_id());
        info!(%id, ?post, "insert post");
        Ok(id)
    }

    async fn update(&self, post: &Post) -> Result<PostId, Self::Error> {
        info!(?post, "update post");
        Ok(post.id.unwrap_or(PostId(self.next_id())))
    }

    async fn set_cover_image(&self, post: PostId, media: MediaId) -> Result<bool, Self::Error> {
        info!(%post, %media, "set cover image");
        Ok(true)
    }

    async fn upsert_meta(
        &self,
        post: PostId,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), Self::Error> {
        info!(%post, key, %value, "upsert meta");
        Ok(())
    }

    async fn find_category(&self, _: &str) -> Result<Option<CategoryId>, Self::Error> {
        Ok(None)
    }

    async fn create_category(&self, name: &str) -> Result<CategoryId, Self::Error> {
        let id = CategoryId(self.next_id());
        info!(%id, name, "create category");
        Ok(id)
    }

    async fn find_term(&self, _: &str, _: &str) -> Result<Option<TermId>, Self::Error> {
        Ok(None)
    }

    async fn create_term(&self, name: &str, taxonomy: &str) -> Result<TermId, Self::Error> {
        let id = TermId(self.next_id());
        info!(%id, name, taxonomy, "create term");
        Ok(id)
    }

    async fn find_attachment(&self, _: &str) -> Result<Option<MediaId>, Self::Error> {
        Ok(None)
    }

    async fn fetch_to_temp(&self, source: &str) -> Result<PathBuf, Self::Error> {
        info!(source, "fetch skipped");
        Ok(PathBuf::from(source))
    }

    async fn sideload(&self, temp: &Path, name: &str, post: PostId) -> Result<MediaId, Self::Error> {
        let id = MediaId(self.next_id());
        info!(%id, ?temp, name, %post, "sideload media");
        Ok(id)
    }
}
