use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::store::{CategoryId, PostId, TermId};

pub const ID: &str = "ID";
pub const AUTHOR: &str = "post_author";
pub const TITLE: &str = "post_title";
pub const SLUG: &str = "post_name";
pub const CONTENT: &str = "post_content";
pub const EXCERPT: &str = "post_excerpt";
pub const STATUS: &str = "post_status";
pub const TYPE: &str = "post_type";
pub const PARENT: &str = "post_parent";
pub const COMMENT_STATUS: &str = "comment_status";
pub const PING_STATUS: &str = "ping_status";
pub const MENU_ORDER: &str = "menu_order";
pub const PAGE_TEMPLATE: &str = "page_template";
pub const TAGS: &str = "tags_input";
pub const CATEGORIES: &str = "post_category";
pub const TAXONOMIES: &str = "tax_input";
pub const META: &str = "meta";
pub const IMAGES: &str = "images";

/// One importable content item, keyed by the store's field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct ImportRecord(Map<String, Value>);

impl ImportRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline values every record is merged over.
    pub fn defaults() -> Self {
        Self::from(json!({
            ID: "",
            AUTHOR: "",
            TITLE: "",
            SLUG: "",
            CONTENT: "",
            EXCERPT: "",
            STATUS: "publish",
            TYPE: "post",
            PARENT: 0,
            COMMENT_STATUS: "closed",
            PING_STATUS: "closed",
            MENU_ORDER: 0,
            PAGE_TEMPLATE: 0,
            TAGS: [],
            CATEGORIES: [],
            TAXONOMIES: {},
            META: {},
            IMAGES: [],
        }))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes a field, keeping the order of the remaining ones.
    pub fn take(&mut self, key: &str) -> Value {
        self.0.shift_remove(key).unwrap_or(Value::Null)
    }

    pub fn title(&self) -> String {
        self.0.get(TITLE).map(coerce_string).unwrap_or_default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn merged_over(&self, defaults: &ImportRecord) -> ImportRecord {
        Self(merge_mappings(&self.0, &defaults.0))
    }
}

impl From<Value> for ImportRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}

impl From<ImportRecord> for Value {
    fn from(record: ImportRecord) -> Self {
        Value::Object(record.0)
    }
}

fn as_mapping(value: &Value) -> &Map<String, Value> {
    static EMPTY: std::sync::LazyLock<Map<String, Value>> = std::sync::LazyLock::new(Map::new);
    match value {
        Value::Object(fields) => fields,
        _ => &EMPTY,
    }
}

/// Recursively merges `input` over `defaults`.
///
/// Keys missing from `input` take the default. Where both sides hold a mapping the two are
/// merged key by key; any other input value (scalars, sequences) replaces the default
/// outright. A non-mapping on either side is treated as an empty mapping.
pub fn merge(input: &Value, defaults: &Value) -> Value {
    Value::Object(merge_mappings(as_mapping(input), as_mapping(defaults)))
}

fn merge_mappings(input: &Map<String, Value>, defaults: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in input {
        let value = match (value, merged.get(key)) {
            (Value::Object(input), Some(Value::Object(existing))) => {
                Value::Object(merge_mappings(input, existing))
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Whether a field counts as absent: null, `false`, zero, `""`, `"0"`, or an empty collection.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

pub(crate) fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_owned(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn coerce_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        Value::Bool(b) => *b as i64,
        _ => 0,
    }
}

pub(crate) fn coerce_u64(value: &Value) -> u64 {
    coerce_i64(value).max(0) as u64
}

/// A field given either as one delimited string or as a sequence of names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermList {
    Delimited(String),
    Sequence(Vec<String>),
}

impl TermList {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::Sequence(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(coerce_string)
                    .collect(),
            ),
            Value::Object(fields) => Self::Sequence(
                fields
                    .values()
                    .filter(|item| !item.is_null())
                    .map(coerce_string)
                    .collect(),
            ),
            Value::String(s) => Self::Delimited(s.clone()),
            Value::Number(n) => Self::Delimited(n.to_string()),
            Value::Null | Value::Bool(_) => Self::Sequence(Vec::new()),
        }
    }

    /// Normalizes into names in input order. Delimited strings are split on `,`; every name
    /// is trimmed and blanks are dropped. Duplicates are kept.
    pub fn into_names(self) -> Vec<String> {
        let names: Vec<String> = match self {
            Self::Delimited(s) => s.split(',').map(str::to_owned).collect(),
            Self::Sequence(names) => names,
        };
        names
            .into_iter()
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl From<&str> for TermList {
    fn from(s: &str) -> Self {
        Self::Delimited(s.to_owned())
    }
}

impl From<Vec<String>> for TermList {
    fn from(names: Vec<String>) -> Self {
        Self::Sequence(names)
    }
}

impl From<Vec<&str>> for TermList {
    fn from(names: Vec<&str>) -> Self {
        Self::Sequence(names.into_iter().map(str::to_owned).collect())
    }
}

/// The native fields handed to the store on insert or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: Option<PostId>,
    pub author: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub post_type: String,
    pub parent: u64,
    pub comment_status: String,
    pub ping_status: String,
    pub menu_order: i64,
    pub page_template: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<CategoryId>,
    pub taxonomies: IndexMap<String, Vec<TermId>>,
    /// Fields the store has no column for, passed through untouched.
    pub extra: Map<String, Value>,
}

impl Post {
    /// Decomposes a merged record into native fields. Malformed values are coerced, never
    /// rejected.
    pub fn from_record(mut record: ImportRecord) -> Self {
        let id = coerce_u64(&record.take(ID));
        let page_template = record.take(PAGE_TEMPLATE);
        Self {
            id: (id > 0).then_some(PostId(id)),
            author: coerce_string(&record.take(AUTHOR)),
            title: coerce_string(&record.take(TITLE)),
            slug: coerce_string(&record.take(SLUG)),
            content: coerce_string(&record.take(CONTENT)),
            excerpt: coerce_string(&record.take(EXCERPT)),
            status: coerce_string(&record.take(STATUS)),
            post_type: coerce_string(&record.take(TYPE)),
            parent: coerce_u64(&record.take(PARENT)),
            comment_status: coerce_string(&record.take(COMMENT_STATUS)),
            ping_status: coerce_string(&record.take(PING_STATUS)),
            menu_order: coerce_i64(&record.take(MENU_ORDER)),
            page_template: (!is_empty_value(&page_template)).then(|| coerce_string(&page_template)),
            tags: TermList::from_value(&record.take(TAGS)).into_names(),
            categories: Vec::new(),
            taxonomies: IndexMap::new(),
            extra: record.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSyntax {
    Yaml,
    Json,
    Toml,
}

impl DocumentSyntax {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to read document: {0}")]
    Read(std::io::Error),
    #[error("Unknown document syntax: {0}")]
    UnknownSyntax(String),
    #[error("Failed to parse YAML document: {0}")]
    ParseYaml(serde_yaml::Error),
    #[error("Failed to parse JSON document: {0}")]
    ParseJson(serde_json::Error),
    #[error("Failed to parse TOML document: {0}")]
    ParseToml(toml::de::Error),
}

#[derive(Deserialize)]
struct TomlDocument {
    #[serde(default)]
    posts: Vec<Value>,
}

/// Parses a document holding either a sequence of records or a single record.
pub fn parse_records(content: &str, syntax: DocumentSyntax) -> Result<Vec<ImportRecord>, DocumentError> {
    let document = match syntax {
        DocumentSyntax::Yaml => {
            serde_yaml::from_str::<Value>(content).map_err(DocumentError::ParseYaml)?
        }
        DocumentSyntax::Json => {
            serde_json::from_str::<Value>(content).map_err(DocumentError::ParseJson)?
        }
        DocumentSyntax::Toml => {
            let document: TomlDocument =
                toml::from_str(content).map_err(DocumentError::ParseToml)?;
            Value::Array(document.posts)
        }
    };
    Ok(match document {
        Value::Array(records) => records.into_iter().map(ImportRecord::from).collect(),
        Value::Null => Vec::new(),
        record => vec![ImportRecord::from(record)],
    })
}

pub async fn load_records(path: &Path) -> Result<Vec<ImportRecord>, DocumentError> {
    let syntax = DocumentSyntax::from_path(path)
        .ok_or_else(|| DocumentError::UnknownSyntax(path.display().to_string()))?;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(DocumentError::Read)?;
    parse_records(&content, syntax)
}
