use std::path::{Path, PathBuf};

use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to fetch remote object ({url}): {error}")]
    FetchRemote { error: reqwest::Error, url: url::Url },
    #[error("remote object ({url}) answered {status}")]
    Status {
        status: reqwest::StatusCode,
        url: url::Url,
    },
    #[error("failed to read local file ({path}): {error}")]
    ReadLocal { error: std::io::Error, path: String },
    #[error("failed to write temporary file ({path:?}): {error}")]
    WriteTemp {
        error: std::io::Error,
        path: PathBuf,
    },
}

/// Names derived from an image source: the attachment title and the upload file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    pub stem: String,
    pub basename: String,
}

impl SourceName {
    pub fn parse(src: &str) -> Self {
        let path = match url::Url::parse(src) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url.path().to_owned(),
            _ => src.to_owned(),
        };
        let path = Path::new(path.trim_end_matches('/'));
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { stem, basename }
    }
}

fn remote_url(src: &str) -> Option<url::Url> {
    url::Url::parse(src)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

async fn load_remote(client: &reqwest::Client, url: &url::Url) -> Result<Vec<u8>, Error> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|error| Error::FetchRemote {
            error,
            url: url.clone(),
        })?;
    if !response.status().is_success() {
        return Err(Error::Status {
            status: response.status(),
            url: url.clone(),
        });
    }
    response
        .bytes()
        .await
        .map(|body| body.to_vec())
        .map_err(|error| Error::FetchRemote {
            error,
            url: url.clone(),
        })
}

pub async fn load(client: &reqwest::Client, src: &str) -> Result<Vec<u8>, Error> {
    if let Some(url) = remote_url(src) {
        return load_remote(client, &url).await;
    }
    tokio::fs::read(src)
        .await
        .map_err(|error| Error::ReadLocal {
            error,
            path: src.to_owned(),
        })
}

/// Loads `src` and writes it into `dir`. The file name is stable per source so a retried
/// fetch overwrites its own leftovers.
pub async fn fetch_to_temp(
    client: &reqwest::Client,
    src: &str,
    dir: &Path,
) -> Result<PathBuf, Error> {
    let body = load(client, src).await?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|error| Error::WriteTemp {
            error,
            path: dir.to_owned(),
        })?;
    let name = SourceName::parse(src);
    let path = dir.join(format!(
        "{}-{}",
        blake3::hash(src.as_bytes()).to_hex(),
        name.basename
    ));
    trace!(src, ?path, size = body.len(), "write temporary file");
    if let Err(error) = tokio::fs::write(&path, &body).await {
        remove_temp(&path).await;
        return Err(Error::WriteTemp { error, path });
    }
    Ok(path)
}

/// Best-effort removal; a missing file is not an error.
pub async fn remove_temp(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }
    if let Err(error) = tokio::fs::remove_file(path).await {
        debug!(%error, ?path, "temporary file not removed");
    }
}
