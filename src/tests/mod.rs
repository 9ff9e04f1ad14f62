use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::{
    ErrorDetail, ImportRecord, Importer, TermList,
    error_log::Label,
    fetch::SourceName,
    record::Post,
    store::{CategoryId, ContentStore, MediaId, PostId, TermId},
};


#[derive(Debug, Clone, PartialEq)]
enum Call {
    FindByTitle { title: String, post_type: String },
    Insert(Post),
    Update(Post),
    SetCoverImage { post: PostId, media: MediaId },
    UpsertMeta { post: PostId, key: String, value: Value },
    FindCategory(String),
    CreateCategory(String),
    FindTerm { name: String, taxonomy: String },
    CreateTerm { name: String, taxonomy: String },
    FindAttachment(String),
    FetchToTemp(String),
    Sideload { name: String, post: PostId },
}

impl Call {
    fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Insert(_)
                | Self::Update(_)
                | Self::SetCoverImage { .. }
                | Self::UpsertMeta { .. }
                | Self::CreateCategory(_)
                | Self::CreateTerm { .. }
                | Self::FetchToTemp(_)
                | Self::Sideload { .. }
        )
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    next_id: u64,
    posts: IndexMap<(String, String), PostId>,
    categories: IndexMap<String, CategoryId>,
    terms: IndexMap<(String, String), TermId>,
    attachments: IndexMap<String, MediaId>,
    failing_lookups: HashSet<String>,
    failing_inserts: HashSet<String>,
    failing_updates: HashSet<String>,
    failing_categories: HashSet<String>,
    failing_terms: HashSet<String>,
    failing_fetches: HashSet<String>,
    failing_sideloads: HashSet<String>,
    failing_meta: HashSet<String>,
    refuse_cover: bool,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, thiserror::Error)]
#[error("mock failure: {0}")]
struct MockError(String);

/// Records every call and keeps just enough state to answer lookups.
struct MockStore {
    state: tokio::sync::Mutex<MockState>,
    temp: tempfile::TempDir,
}

impl MockStore {
    fn new() -> Self {
        Self {
            state: Default::default(),
            temp: tempfile::tempdir().unwrap(),
        }
    }

    async fn seed_post(&self, title: &str, post_type: &str) -> PostId {
        let mut state = self.state.lock().await;
        let id = PostId(state.next_id());
        state.posts.insert((post_type.into(), title.into()), id);
        id
    }

    async fn seed_category(&self, name: &str) -> CategoryId {
        let mut state = self.state.lock().await;
        let id = CategoryId(state.next_id());
        state.categories.insert(name.into(), id);
        id
    }

    async fn seed_term(&self, name: &str, taxonomy: &str) -> TermId {
        let mut state = self.state.lock().await;
        let id = TermId(state.next_id());
        state.terms.insert((name.into(), taxonomy.into()), id);
        id
    }

    async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    async fn writes(&self) -> Vec<Call> {
        self.calls().await.into_iter().filter(Call::is_write).collect()
    }

    async fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().await.iter().filter(|&call| pred(call)).count()
    }
}

impl ContentStore for MockStore {
    type Error = MockError;

    async fn find_by_title(&self, title: &str, post_type: &str) -> Result<Option<PostId>, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::FindByTitle {
            title: title.into(),
            post_type: post_type.into(),
        });
        if state.failing_lookups.contains(title) {
            return Err(MockError(format!("lookup {title}")));
        }
        Ok(state.posts.get(&(post_type.to_owned(), title.to_owned())).copied())
    }

    async fn insert(&self, post: &Post) -> Result<PostId, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Insert(post.clone()));
        if state.failing_inserts.contains(&post.title) {
            return Err(MockError(format!("insert {}", post.title)));
        }
        let id = PostId(state.next_id());
        state
            .posts
            .insert((post.post_type.clone(), post.title.clone()), id);
        Ok(id)
    }

    async fn update(&self, post: &Post) -> Result<PostId, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Update(post.clone()));
        if state.failing_updates.contains(&post.title) {
            return Err(MockError(format!("update {}", post.title)));
        }
        post.id.ok_or_else(|| MockError("update without id".into()))
    }

    async fn set_cover_image(&self, post: PostId, media: MediaId) -> Result<bool, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::SetCoverImage { post, media });
        Ok(!state.refuse_cover)
    }

    async fn upsert_meta(&self, post: PostId, key: &str, value: &Value) -> Result<(), MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::UpsertMeta {
            post,
            key: key.into(),
            value: value.clone(),
        });
        if state.failing_meta.contains(key) {
            return Err(MockError(format!("meta {key}")));
        }
        Ok(())
    }

    async fn find_category(&self, name: &str) -> Result<Option<CategoryId>, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::FindCategory(name.into()));
        Ok(state.categories.get(name).copied())
    }

    async fn create_category(&self, name: &str) -> Result<CategoryId, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::CreateCategory(name.into()));
        if state.failing_categories.contains(name) {
            return Err(MockError(format!("category {name}")));
        }
        let id = CategoryId(state.next_id());
        state.categories.insert(name.into(), id);
        Ok(id)
    }

    async fn find_term(&self, name: &str, taxonomy: &str) -> Result<Option<TermId>, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::FindTerm {
            name: name.into(),
            taxonomy: taxonomy.into(),
        });
        Ok(state
            .terms
            .get(&(name.to_owned(), taxonomy.to_owned()))
            .copied())
    }

    async fn create_term(&self, name: &str, taxonomy: &str) -> Result<TermId, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::CreateTerm {
            name: name.into(),
            taxonomy: taxonomy.into(),
        });
        if state.failing_terms.contains(name) {
            return Err(MockError(format!("term {name}")));
        }
        let id = TermId(state.next_id());
        state.terms.insert((name.into(), taxonomy.into()), id);
        Ok(id)
    }

    async fn find_attachment(&self, name: &str) -> Result<Option<MediaId>, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::FindAttachment(name.into()));
        Ok(state.attachments.get(name).copied())
    }

    async fn fetch_to_temp(&self, source: &str) -> Result<PathBuf, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::FetchToTemp(source.into()));
        if state.failing_fetches.contains(source) {
            return Err(MockError(format!("fetch {source}")));
        }
        let path = self.temp.path().join(SourceName::parse(source).basename);
        tokio::fs::write(&path, b"image")
            .await
            .map_err(|error| MockError(error.to_string()))?;
        Ok(path)
    }

    async fn sideload(&self, temp: &Path, name: &str, post: PostId) -> Result<MediaId, MockError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::Sideload {
            name: name.into(),
            post,
        });
        if state.failing_sideloads.contains(name) {
            return Err(MockError(format!("sideload {name}")));
        }
        let _ = tokio::fs::remove_file(temp).await;
        let id = MediaId(state.next_id());
        let stem = SourceName::parse(name).stem;
        state.attachments.insert(stem, id);
        Ok(id)
    }
}

fn record(value: Value) -> ImportRecord {
    ImportRecord::from(value)
}

#[tokio::test]
async fn hello_scenario_inserts_once_with_defaults() {
    let mut importer = Importer::new(MockStore::new());
    let id = importer
        .import_one(
            record(json!({ "post_title": "Hello", "meta": { "price": "" }, "images": [] })),
            true,
        )
        .await
        .unwrap();

    let calls = importer.store().calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        Call::FindByTitle {
            title: "Hello".into(),
            post_type: "post".into()
        }
    );
    let Call::Insert(post) = &calls[1] else {
        panic!("expected insert, got {:?}", calls[1]);
    };
    assert_eq!(post.status, "publish");
    assert_eq!(post.post_type, "post");
    assert_eq!(post.comment_status, "closed");
    assert_eq!(post.id, None);
    assert!(post.extra.is_empty());
    assert_eq!(id, PostId(1));
    assert!(importer.errors().is_empty());
}

#[tokio::test]
async fn existing_title_without_update_writes_nothing() {
    let store = MockStore::new();
    let existing = store.seed_post("Hello", "post").await;
    let mut importer = Importer::new(store);

    let id = importer
        .import_one(
            record(json!({
                "post_title": "Hello",
                "post_category": ["news"],
                "tax_input": { "genre": "jazz" },
                "meta": { "price": "10" },
                "images": ["https://example.com/a.jpg"],
            })),
            false,
        )
        .await
        .unwrap();

    assert_eq!(id, existing);
    assert_eq!(importer.store().writes().await, vec![]);
}

#[tokio::test]
async fn existing_title_with_update_issues_update() {
    let store = MockStore::new();
    let existing = store.seed_post("Hello", "page").await;
    let mut importer = Importer::new(store);

    let id = importer
        .import_one(
            record(json!({ "post_title": "Hello", "post_type": "page", "post_content": "v2" })),
            true,
        )
        .await
        .unwrap();

    assert_eq!(id, existing);
    let writes = importer.store().writes().await;
    assert_eq!(writes.len(), 1);
    let Call::Update(post) = &writes[0] else {
        panic!("expected update, got {:?}", writes[0]);
    };
    assert_eq!(post.id, Some(existing));
    assert_eq!(post.content, "v2");
}

#[tokio::test]
async fn same_title_in_another_type_is_inserted() {
    let store = MockStore::new();
    store.seed_post("Hello", "page").await;
    let mut importer = Importer::new(store);

    importer
        .import_one(record(json!({ "post_title": "Hello" })), true)
        .await
        .unwrap();

    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::Insert(_)))
            .await,
        1
    );
}

#[tokio::test]
async fn categories_reuse_existing_and_create_missing() {
    let store = MockStore::new();
    let news = store.seed_category("news").await;
    let importer = Importer::new(store);

    let ids = importer
        .resolve_categories(TermList::from("news, sport,news"))
        .await
        .unwrap();

    let calls = importer.store().calls().await;
    assert_eq!(
        calls
            .iter()
            .filter(|call| matches!(call, Call::CreateCategory(_)))
            .collect::<Vec<_>>(),
        vec![&Call::CreateCategory("sport".into())]
    );
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], news);
    assert_eq!(ids[2], news);
    assert_ne!(ids[1], news);
}

#[tokio::test]
async fn categories_are_attached_to_the_inserted_post() {
    let store = MockStore::new();
    let news = store.seed_category("news").await;
    let mut importer = Importer::new(store);

    importer
        .import_one(
            record(json!({ "post_title": "Hello", "post_category": ["news"] })),
            true,
        )
        .await
        .unwrap();

    let calls = importer.store().calls().await;
    let post = calls
        .iter()
        .find_map(|call| match call {
            Call::Insert(post) => Some(post),
            _ => None,
        })
        .unwrap();
    assert_eq!(post.categories, vec![news]);
}

#[tokio::test]
async fn taxonomy_resolution_creates_each_missing_term_once() {
    let store = MockStore::new();
    let jazz = store.seed_term("jazz", "genre").await;
    let importer = Importer::new(store);

    let resolved = importer
        .resolve_taxonomy(&json!({
            "genre": "jazz,blues",
            "mood": ["calm"],
        }))
        .await
        .unwrap();

    assert_eq!(resolved.keys().collect::<Vec<_>>(), vec!["genre", "mood"]);
    assert_eq!(resolved["genre"].len(), 2);
    assert_eq!(resolved["genre"][0], jazz);
    assert_eq!(resolved["mood"].len(), 1);
    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::CreateTerm { .. }))
            .await,
        2
    );
}

#[tokio::test]
async fn malformed_taxonomy_input_is_ignored() {
    let importer = Importer::new(MockStore::new());
    let resolved = importer.resolve_taxonomy(&json!("genre")).await.unwrap();
    assert!(resolved.is_empty());
    assert!(importer.store().calls().await.is_empty());
}

#[tokio::test]
async fn meta_skips_empty_values() {
    let mut importer = Importer::new(MockStore::new());
    importer
        .attach_meta(PostId(5), &json!({ "a": "", "b": "x", "c": null, "d": 0 }))
        .await;

    assert_eq!(
        importer.store().calls().await,
        vec![Call::UpsertMeta {
            post: PostId(5),
            key: "b".into(),
            value: json!("x")
        }]
    );
}

#[tokio::test]
async fn meta_failure_is_logged_and_remaining_keys_still_written() {
    let store = MockStore::new();
    store.state.lock().await.failing_meta.insert("a".into());
    let mut importer = Importer::new(store);

    importer
        .attach_meta(PostId(5), &json!({ "a": "1", "b": "2" }))
        .await;

    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::UpsertMeta { .. }))
            .await,
        2
    );
    let entries = importer.errors().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, Label::PostMeta);
    assert!(entries[0].message.contains("post 5"));
}

#[tokio::test]
async fn image_resolution_is_idempotent_across_runs() {
    let mut importer = Importer::new(MockStore::new());
    let source = "https://example.com/media/red-chair.jpg";

    let first = importer.resolve_image(PostId(1), source).await.unwrap();
    importer.store().clear_calls().await;
    let second = importer.resolve_image(PostId(1), source).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        importer.store().calls().await,
        vec![Call::FindAttachment("red-chair".into())]
    );
}

#[tokio::test]
async fn first_resolved_image_becomes_cover() {
    let store = MockStore::new();
    store
        .state
        .lock()
        .await
        .failing_fetches
        .insert("https://example.com/broken.jpg".into());
    let mut importer = Importer::new(store);

    importer
        .attach_images(
            PostId(3),
            TermList::from("https://example.com/broken.jpg, https://example.com/ok.jpg"),
        )
        .await;

    let calls = importer.store().calls().await;
    let media = calls
        .iter()
        .find_map(|call| match call {
            Call::Sideload { name, .. } if name == "ok.jpg" => Some(()),
            _ => None,
        });
    assert!(media.is_some());
    let cover = calls
        .iter()
        .filter_map(|call| match call {
            Call::SetCoverImage { post, media } => Some((*post, *media)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(cover.len(), 1);
    assert_eq!(cover[0].0, PostId(3));
    assert_eq!(importer.errors().with_label(Label::PostImage).count(), 1);
    // a failed fetch never reaches the sideload call
    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::Sideload { name, .. } if name == "broken.jpg"))
            .await,
        0
    );
}

#[tokio::test]
async fn no_images_means_no_calls() {
    let mut importer = Importer::new(MockStore::new());
    importer.attach_images(PostId(3), TermList::from("")).await;
    importer
        .attach_images(PostId(3), TermList::Sequence(Vec::new()))
        .await;
    assert!(importer.store().calls().await.is_empty());
    assert!(importer.errors().is_empty());
}

#[tokio::test]
async fn refused_cover_image_is_logged() {
    let store = MockStore::new();
    store.state.lock().await.refuse_cover = true;
    let mut importer = Importer::new(store);

    importer
        .attach_images(PostId(3), TermList::from(vec!["/srv/img/a.png"]))
        .await;

    let entries = importer.errors().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, Label::CoverImage);
}

#[tokio::test]
async fn failed_sideload_removes_temp_file() {
    let store = MockStore::new();
    store
        .state
        .lock()
        .await
        .failing_sideloads
        .insert("a.png".into());
    let temp = store.temp.path().join("a.png");
    let mut importer = Importer::new(store);

    let media = importer.resolve_image(PostId(9), "/srv/img/a.png").await;

    assert_eq!(media, None);
    assert!(!temp.exists());
    let entries = importer.errors().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, Label::PostImage);
    assert!(entries[0].message.contains("post 9"));
}

#[tokio::test]
async fn batch_keeps_order_when_one_image_fails() {
    let store = MockStore::new();
    store
        .state
        .lock()
        .await
        .failing_fetches
        .insert("https://example.com/two.jpg".into());
    let mut importer = Importer::new(store);

    let ids = importer
        .import_many(
            vec![
                record(json!({ "post_title": "One" })),
                record(json!({ "post_title": "Two", "images": ["https://example.com/two.jpg"] })),
                record(json!({ "post_title": "Three" })),
            ],
            true,
        )
        .await;

    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(Option::is_some));
    let ids = ids.into_iter().flatten().collect::<Vec<_>>();
    assert!(ids[0] < ids[1] && ids[1] < ids[2]);
    assert_eq!(importer.errors().len(), 1);
    assert_eq!(importer.errors().entries()[0].label, Label::PostImage);
}

#[tokio::test]
async fn batch_continues_past_a_failed_insert() {
    let store = MockStore::new();
    store
        .state
        .lock()
        .await
        .failing_inserts
        .insert("Two".into());
    let mut importer = Importer::new(store);

    let ids = importer
        .import_many(
            vec![
                record(json!({ "post_title": "One" })),
                record(json!({ "post_title": "Two" })),
                record(json!({ "post_title": "Three" })),
            ],
            true,
        )
        .await;

    assert!(ids[0].is_some());
    assert_eq!(ids[1], None);
    assert!(ids[2].is_some());
    let (_, errors) = importer.into_parts();
    let entries = errors.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, Label::Post);
    assert!(entries[0].message.contains("\"Two\""));
}

#[tokio::test]
async fn configured_defaults_apply_under_the_record() {
    let overrides = record(json!({
        "post_status": "draft",
        "meta": { "source": "feed", "lang": "en" },
    }));
    let mut importer = Importer::new(MockStore::new()).with_defaults(&overrides);

    let id = importer
        .import_one(
            record(json!({ "post_title": "Hello", "meta": { "lang": "fr" } })),
            true,
        )
        .await
        .unwrap();

    let calls = importer.store().calls().await;
    let Some(Call::Insert(post)) = calls.get(1) else {
        panic!("expected insert, got {calls:?}");
    };
    assert_eq!(post.status, "draft");
    assert_eq!(
        calls[2..].to_vec(),
        vec![
            Call::UpsertMeta {
                post: id,
                key: "source".into(),
                value: json!("feed")
            },
            Call::UpsertMeta {
                post: id,
                key: "lang".into(),
                value: json!("fr")
            },
        ]
    );
}

#[tokio::test]
async fn failed_title_lookup_writes_nothing() {
    let store = MockStore::new();
    store.state.lock().await.failing_lookups.insert("Hello".into());
    let mut importer = Importer::new(store);

    let error = importer
        .import_one(
            record(json!({ "post_title": "Hello", "post_category": ["news"] })),
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(&*error.detail, ErrorDetail::FindPost(_)));
    assert_eq!(error.context.id, None);
    assert_eq!(importer.store().writes().await, vec![]);
}

#[tokio::test]
async fn failed_category_creation_stops_before_insert() {
    let store = MockStore::new();
    store
        .state
        .lock()
        .await
        .failing_categories
        .insert("sport".into());
    let mut importer = Importer::new(store);

    let error = importer
        .import_one(
            record(json!({ "post_title": "Hello", "post_category": "news, sport" })),
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        &*error.detail,
        ErrorDetail::ResolveCategory { name, .. } if name == "sport"
    ));
    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::Insert(_) | Call::Update(_)))
            .await,
        0
    );
}

#[tokio::test]
async fn failed_term_creation_leaves_an_empty_slot() {
    let store = MockStore::new();
    store.state.lock().await.failing_terms.insert("blues".into());
    let mut importer = Importer::new(store);

    let ids = importer
        .import_many(
            vec![
                record(json!({ "post_title": "One" })),
                record(json!({ "post_title": "Two", "tax_input": { "genre": "jazz,blues" } })),
                record(json!({ "post_title": "Three", "tax_input": { "genre": "jazz" } })),
            ],
            true,
        )
        .await;

    assert!(ids[0].is_some());
    assert_eq!(ids[1], None);
    assert!(ids[2].is_some());
    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::Insert(post) if post.title == "Two"))
            .await,
        0
    );
    let entries = importer.errors().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, Label::Post);
    assert!(entries[0].message.contains("\"blues\" in genre"));
}

#[tokio::test]
async fn failed_update_carries_the_existing_id() {
    let store = MockStore::new();
    let existing = store.seed_post("Hello", "post").await;
    store.state.lock().await.failing_updates.insert("Hello".into());
    let mut importer = Importer::new(store);

    let error = importer
        .import_one(
            record(json!({ "post_title": "Hello", "meta": { "price": "10" } })),
            true,
        )
        .await
        .unwrap_err();

    assert!(matches!(&*error.detail, ErrorDetail::UpdatePost(_)));
    assert_eq!(error.context.id, Some(existing));
    assert!(error.to_string().starts_with(&format!("{existing}(\"Hello\")")));
    assert_eq!(
        importer
            .store()
            .count(|call| matches!(call, Call::UpsertMeta { .. }))
            .await,
        0
    );
}
