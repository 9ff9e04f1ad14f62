//! Record import: merge with defaults, resolve terms, upsert by title, then enrich.
//!
//! Records are processed strictly one after another. Failures while writing the post
//! itself surface as [`Error`]; failures while attaching meta data or images only land in
//! the [`ErrorLog`], because the post is already committed at that point.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    Error, ErrorContext, ErrorDetail,
    error_log::{ErrorLog, Label},
    log_error,
    progress::{EntryStatus, NullReporter, ProgressReporter},
    record::{CATEGORIES, IMAGES, ImportRecord, META, Post, TAXONOMIES, TermList, is_empty_value},
    store::{ContentStore, PostId},
};

mod image;
mod taxonomy;

pub struct Importer<S> {
    store: S,
    defaults: ImportRecord,
    errors: ErrorLog,
    reporter: Arc<dyn ProgressReporter>,
    entry: Option<String>,
}

impl<S: ContentStore> Importer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            defaults: ImportRecord::defaults(),
            errors: ErrorLog::new(),
            reporter: Arc::new(NullReporter),
            entry: None,
        }
    }

    /// Layers `overrides` over the built-in defaults.
    pub fn with_defaults(mut self, overrides: &ImportRecord) -> Self {
        self.defaults = overrides.merged_over(&self.defaults);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn defaults(&self) -> &ImportRecord {
        &self.defaults
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn into_parts(self) -> (S, ErrorLog) {
        (self.store, self.errors)
    }

    fn report(&self, status: EntryStatus) {
        if let Some(entry) = &self.entry {
            self.reporter.update_entry(entry, status);
        }
    }

    /// Imports every record in order. The result has one slot per input record; a record
    /// whose post could not be written is logged and yields `None`.
    pub async fn import_many(
        &mut self,
        records: Vec<ImportRecord>,
        update_existing: bool,
    ) -> Vec<Option<PostId>> {
        let entries = records
            .iter()
            .enumerate()
            .map(|(index, record)| format!("#{index} {:?}", record.title()))
            .collect::<Vec<_>>();
        self.reporter.register_entries(entries.clone());

        let mut ids = Vec::with_capacity(records.len());
        for (record, entry) in records.into_iter().zip(entries) {
            self.entry = Some(entry);
            self.report(EntryStatus::Writing);
            match self.import_one(record, update_existing).await {
                Ok(id) => {
                    self.report(EntryStatus::Done);
                    ids.push(Some(id));
                }
                Err(error) => {
                    self.report(EntryStatus::Failed(error.detail.to_string()));
                    log_error!(self.errors, Label::Post, "{error}");
                    ids.push(None);
                }
            }
        }
        self.entry = None;
        ids
    }

    pub async fn import_one(
        &mut self,
        record: ImportRecord,
        update_existing: bool,
    ) -> Result<PostId, Error> {
        let mut merged = record.merged_over(&self.defaults);

        let taxonomies = merged.take(TAXONOMIES);
        let categories = merged.take(CATEGORIES);
        let meta = merged.take(META);
        let images = merged.take(IMAGES);

        let mut post = Post::from_record(merged);
        let context = ErrorContext::new(post.title.clone());

        let existing = self
            .store
            .find_by_title(&post.title, &post.post_type)
            .await
            .map_err(|error| context.error(ErrorDetail::FindPost(Box::new(error))))?;

        // A skipped post gets no writes at all, term creation included.
        if let Some(id) = existing.filter(|_| !update_existing) {
            debug!(%id, title = post.title, "post exists, left untouched");
            return Ok(id);
        }

        if !is_empty_value(&categories) {
            post.categories = self
                .resolve_categories(TermList::from_value(&categories))
                .await
                .map_err(|detail| context.error(detail))?;
        }

        if !is_empty_value(&taxonomies) {
            post.taxonomies = self
                .resolve_taxonomy(&taxonomies)
                .await
                .map_err(|detail| context.error(detail))?;
        }

        let id = match existing {
            Some(id) => {
                post.id = Some(id);
                let context = context.with_id(id);
                let id = self
                    .store
                    .update(&post)
                    .await
                    .map_err(|error| context.error(ErrorDetail::UpdatePost(Box::new(error))))?;
                info!(%id, title = post.title, "updated post");
                id
            }
            None => {
                let id = self
                    .store
                    .insert(&post)
                    .await
                    .map_err(|error| context.error(ErrorDetail::InsertPost(Box::new(error))))?;
                info!(%id, title = post.title, "inserted post");
                id
            }
        };

        if !is_empty_value(&meta) {
            self.report(EntryStatus::AttachingMeta);
            self.attach_meta(id, &meta).await;
        }

        if !is_empty_value(&images) {
            self.attach_images(id, TermList::from_value(&images)).await;
        }

        Ok(id)
    }

    /// Writes each non-empty meta value. A failed key is logged and the rest still run.
    pub async fn attach_meta(&mut self, id: PostId, meta: &Value) {
        let Value::Object(meta) = meta else {
            debug!(%id, ?meta, "meta is not a mapping, ignored");
            return;
        };
        for (key, value) in meta {
            if is_empty_value(value) {
                continue;
            }
            if let Err(error) = self.store.upsert_meta(id, key, value).await {
                log_error!(
                    self.errors,
                    Label::PostMeta,
                    "Error adding meta data {key:?} for post {id}: {error}"
                );
            }
        }
    }

    /// Resolves every image and makes the first one that resolved the cover image.
    pub async fn attach_images(&mut self, id: PostId, images: TermList) {
        let sources = images.into_names();
        let total = sources.len();

        let mut media = Vec::with_capacity(total);
        for (index, source) in sources.iter().enumerate() {
            self.report(EntryStatus::AttachingImages {
                current: index + 1,
                total,
            });
            if let Some(media_id) = self.resolve_image(id, source).await {
                media.push(media_id);
            }
        }

        let Some(&cover) = media.first() else {
            return;
        };
        match self.store.set_cover_image(id, cover).await {
            Ok(true) => debug!(%id, %cover, "set cover image"),
            Ok(false) => log_error!(
                self.errors,
                Label::CoverImage,
                "Error setting cover image {cover} for post {id}"
            ),
            Err(error) => log_error!(
                self.errors,
                Label::CoverImage,
                "Error setting cover image {cover} for post {id}: {error}"
            ),
        }
    }
}
