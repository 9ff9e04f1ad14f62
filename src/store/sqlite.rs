use std::{
    path::{Path, PathBuf},
    str::FromStr as _,
};

use indexmap::IndexMap;
use sqlx::SqliteConnection;
use tracing::{error, trace};

use super::{CategoryId, ContentStore, MediaId, PostId, TermId};
use crate::{
    fetch::{self, remove_temp},
    record::Post,
};

pub const CATEGORY_TAXONOMY: &str = "category";
pub const TAG_TAXONOMY: &str = "post_tag";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("{0}")]
    Fetch(#[from] fetch::Error),
    #[error("failed to encode extra fields: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("post {0} not found")]
    PostNotFound(PostId),
    #[error("failed to read temporary file ({path:?}): {error}")]
    ReadTemp {
        error: std::io::Error,
        path: PathBuf,
    },
}

/// A self-contained content store on SQLite.
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
    client: reqwest::Client,
    temp_dir: PathBuf,
}

impl SqliteStore {
    pub async fn open(url: &str, temp_dir: impl Into<PathBuf>) -> Result<Self, sqlx::Error> {
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(url)
            .inspect_err(|error| error!(%error, %url, "Failed to open content db"))?
            .create_if_missing(true);
        let pool = sqlx::pool::PoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .inspect_err(|error| error!(%error, %url, "Failed to open content db"))?;
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS posts(
                id INTEGER PRIMARY KEY,
                post_author TEXT NOT NULL,
                post_title TEXT NOT NULL,
                post_name TEXT NOT NULL,
                post_content TEXT NOT NULL,
                post_excerpt TEXT NOT NULL,
                post_status TEXT NOT NULL,
                post_type TEXT NOT NULL,
                post_parent INTEGER NOT NULL,
                comment_status TEXT NOT NULL,
                ping_status TEXT NOT NULL,
                menu_order INTEGER NOT NULL,
                page_template TEXT,
                extra TEXT NOT NULL,
                thumbnail_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS posts_title ON posts(post_type, post_title);

            CREATE TABLE IF NOT EXISTS terms(
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                taxonomy TEXT NOT NULL,
                UNIQUE(name, taxonomy)
            );

            CREATE TABLE IF NOT EXISTS post_terms(
                post_id INTEGER NOT NULL,
                taxonomy TEXT NOT NULL,
                position INTEGER NOT NULL,
                term_id INTEGER NOT NULL,
                PRIMARY KEY(post_id, taxonomy, position)
            );

            CREATE TABLE IF NOT EXISTS post_meta(
                post_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY(post_id, meta_key)
            );

            CREATE TABLE IF NOT EXISTS attachments(
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                file_name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                body BLOB NOT NULL,
                post_parent INTEGER NOT NULL
            );
        "#,
        )
        .execute(&pool)
        .await
        .inspect_err(|error| error!(%error, %url, "Failed to execute DDL to content db"))?;
        Ok(Self {
            pool,
            client: reqwest::Client::new(),
            temp_dir: temp_dir.into(),
        })
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

async fn find_term_id(
    conn: &mut SqliteConnection,
    name: &str,
    taxonomy: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM terms WHERE name = ? AND taxonomy = ?")
        .bind(name)
        .bind(taxonomy)
        .fetch_optional(conn)
        .await
}

async fn create_term_id(
    conn: &mut SqliteConnection,
    name: &str,
    taxonomy: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("INSERT INTO terms(name, taxonomy) VALUES (?, ?) RETURNING id")
        .bind(name)
        .bind(taxonomy)
        .fetch_one(conn)
        .await
}

/// Replaces every term relationship of `post_id` with the ones carried by `post`.
async fn write_terms(conn: &mut SqliteConnection, post_id: i64, post: &Post) -> Result<(), Error> {
    sqlx::query("DELETE FROM post_terms WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

    let mut tags = Vec::with_capacity(post.tags.len());
    for name in &post.tags {
        let id = match find_term_id(&mut *conn, name, TAG_TAXONOMY).await? {
            Some(id) => id,
            None => create_term_id(&mut *conn, name, TAG_TAXONOMY).await?,
        };
        tags.push(id);
    }

    let mut relationships = IndexMap::new();
    relationships.insert(TAG_TAXONOMY, tags);
    relationships.insert(
        CATEGORY_TAXONOMY,
        post.categories.iter().map(|id| id.0 as i64).collect(),
    );
    // A `tax_input` entry for a built-in taxonomy replaces the list built above.
    for (taxonomy, ids) in &post.taxonomies {
        relationships.insert(taxonomy.as_str(), ids.iter().map(|id| id.0 as i64).collect());
    }
    for (taxonomy, ids) in relationships {
        for (position, term_id) in ids.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO post_terms(post_id, taxonomy, position, term_id) VALUES (?, ?, ?, ?)",
            )
            .bind(post_id)
            .bind(taxonomy)
            .bind(position as i64)
            .bind(term_id)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

fn meta_text(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other),
    }
}

impl ContentStore for SqliteStore {
    type Error = Error;

    async fn find_by_title(&self, title: &str, post_type: &str) -> Result<Option<PostId>, Self::Error> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM posts WHERE post_title = ? AND post_type = ? ORDER BY id LIMIT 1",
        )
        .bind(title)
        .bind(post_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(|id| PostId(id as u64)))
    }

    async fn insert(&self, post: &Post) -> Result<PostId, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO posts(
                id, post_author, post_title, post_name, post_content, post_excerpt,
                post_status, post_type, post_parent, comment_status, ping_status,
                menu_order, page_template, extra
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(post.id.map(|id| id.0 as i64))
        .bind(&post.author)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.status)
        .bind(&post.post_type)
        .bind(post.parent as i64)
        .bind(&post.comment_status)
        .bind(&post.ping_status)
        .bind(post.menu_order)
        .bind(&post.page_template)
        .bind(serde_json::to_string(&post.extra)?)
        .fetch_one(&mut *tx)
        .await?;
        write_terms(&mut *tx, id, post).await?;
        tx.commit().await?;
        trace!(id, title = post.title, "inserted row");
        Ok(PostId(id as u64))
    }

    async fn update(&self, post: &Post) -> Result<PostId, Self::Error> {
        let Some(id) = post.id else {
            return self.insert(post).await;
        };
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE posts SET
                post_author = ?,
                post_title = ?,
                post_name = ?,
                post_content = ?,
                post_excerpt = ?,
                post_status = ?,
                post_type = ?,
                post_parent = ?,
                comment_status = ?,
                ping_status = ?,
                menu_order = ?,
                page_template = ?,
                extra = ?
            WHERE id = ?
        "#,
        )
        .bind(&post.author)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.excerpt)
        .bind(&post.status)
        .bind(&post.post_type)
        .bind(post.parent as i64)
        .bind(&post.comment_status)
        .bind(&post.ping_status)
        .bind(post.menu_order)
        .bind(&post.page_template)
        .bind(serde_json::to_string(&post.extra)?)
        .bind(id.0 as i64)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::PostNotFound(id));
        }
        write_terms(&mut *tx, id.0 as i64, post).await?;
        tx.commit().await?;
        trace!(%id, title = post.title, "updated row");
        Ok(id)
    }

    async fn set_cover_image(&self, post: PostId, media: MediaId) -> Result<bool, Self::Error> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET thumbnail_id = ?
            WHERE id = ? AND EXISTS (SELECT 1 FROM attachments WHERE id = ?)
        "#,
        )
        .bind(media.0 as i64)
        .bind(post.0 as i64)
        .bind(media.0 as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_meta(
        &self,
        post: PostId,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO post_meta(post_id, meta_key, meta_value)
            VALUES (?, ?, ?)
            ON CONFLICT(post_id, meta_key)
            DO UPDATE SET
                meta_value = EXCLUDED.meta_value
        "#,
        )
        .bind(post.0 as i64)
        .bind(key)
        .bind(meta_text(value)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_category(&self, name: &str) -> Result<Option<CategoryId>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let id = find_term_id(&mut conn, name, CATEGORY_TAXONOMY).await?;
        Ok(id.map(|id| CategoryId(id as u64)))
    }

    async fn create_category(&self, name: &str) -> Result<CategoryId, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let id = create_term_id(&mut conn, name, CATEGORY_TAXONOMY).await?;
        Ok(CategoryId(id as u64))
    }

    async fn find_term(&self, name: &str, taxonomy: &str) -> Result<Option<TermId>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let id = find_term_id(&mut conn, name, taxonomy).await?;
        Ok(id.map(|id| TermId(id as u64)))
    }

    async fn create_term(&self, name: &str, taxonomy: &str) -> Result<TermId, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let id = create_term_id(&mut conn, name, taxonomy).await?;
        Ok(TermId(id as u64))
    }

    async fn find_attachment(&self, name: &str) -> Result<Option<MediaId>, Self::Error> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM attachments WHERE title = ? ORDER BY id LIMIT 1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.map(|id| MediaId(id as u64)))
    }

    async fn fetch_to_temp(&self, source: &str) -> Result<PathBuf, Self::Error> {
        Ok(fetch::fetch_to_temp(&self.client, source, &self.temp_dir).await?)
    }

    /// Stores the file body and consumes the temporary file.
    async fn sideload(&self, temp: &Path, name: &str, post: PostId) -> Result<MediaId, Self::Error> {
        let body = tokio::fs::read(temp).await.map_err(|error| Error::ReadTemp {
            error,
            path: temp.to_owned(),
        })?;
        let title = Path::new(name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(name)
            .first_or_octet_stream()
            .to_string();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO attachments(title, file_name, content_type, body, post_parent)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&title)
        .bind(name)
        .bind(&content_type)
        .bind(&body)
        .bind(post.0 as i64)
        .fetch_one(&self.pool)
        .await?;
        trace!(id, title, content_type, size = body.len(), "stored attachment");
        remove_temp(temp).await;
        Ok(MediaId(id as u64))
    }
}
