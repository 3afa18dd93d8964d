//! Object storage operations.
//!
//! Objects live in a bucket under slash-separated paths; the path is
//! percent-encoded into the URL as a single segment.  Uploads stream a
//! local file's bytes; deletes authenticate with the current session
//! token.  All operations run on the shared worker pool.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::auth::Session;
use crate::error::{FirekitError, Result};
use crate::project::ProjectConfig;
use crate::response;
use crate::runner::{self, TaskRunner};
use crate::transport::{self, ApiRequest};

/// Client for the object storage bucket.
pub struct Storage {
    bucket: String,
    storage_url: String,
    session: Session,
    runner: Arc<dyn TaskRunner>,
}

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    items: Vec<ListedObject>,
}

#[derive(Deserialize)]
struct ListedObject {
    name: String,
}

impl Storage {
    /// Creates a client that authenticates deletes with `session`.
    pub fn new(config: &ProjectConfig, session: Session) -> Self {
        Self::with_runner(config, session, runner::shared_pool())
    }

    /// Creates a client with an explicit task runner, for callers and tests
    /// that want to control scheduling.
    pub fn with_runner(
        config: &ProjectConfig,
        session: Session,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            bucket: config.storage_bucket.clone(),
            storage_url: config.storage_url.clone(),
            session,
            runner,
        }
    }

    /// Uploads the file at `local_source` to `remote_path` and returns the
    /// stored object's metadata.
    pub fn upload(&self, local_source: impl AsRef<Path>, remote_path: &str) -> Result<String> {
        require(remote_path, "storage path")?;
        let local = local_source.as_ref();
        let file_name = local
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                FirekitError::InvalidInput("local source must be a file".to_string())
            })?
            .to_string();
        let contents = std::fs::read(local)?;
        debug!(remote_path, bytes = contents.len(), "uploading object");
        let request = ApiRequest::new(Method::POST, self.object_url(remote_path))
            .query("uploadType", "media")
            .query("name", file_name)
            .octets(Bytes::from(contents));
        transport::execute(&self.runner, request)
    }

    /// Fetches the content of the object at `remote_path` from its media
    /// URL.
    pub fn download(&self, remote_path: &str) -> Result<String> {
        require(remote_path, "storage path")?;
        debug!(remote_path, "downloading object");
        let request =
            ApiRequest::new(Method::GET, self.object_url(remote_path)).query("alt", "media");
        transport::execute(&self.runner, request)
    }

    /// Lists the objects under `remote_prefix`, returning display names with
    /// the storage path prefix stripped.
    pub fn list(&self, remote_prefix: &str) -> Result<Vec<String>> {
        require(remote_prefix, "storage path")?;
        let prefix = if remote_prefix.ends_with('/') {
            remote_prefix.to_string()
        } else {
            format!("{}/", remote_prefix)
        };
        let url = format!(
            "{}/b/{}/o",
            self.storage_url.trim_end_matches('/'),
            self.bucket
        );
        let request = ApiRequest::new(Method::GET, url).query("prefix", prefix);
        let body = transport::execute(&self.runner, request)?;
        let listing: Listing = serde_json::from_str(&body)?;
        Ok(listing
            .items
            .into_iter()
            .map(|object| match object.name.rsplit('/').next() {
                Some(display) => display.to_string(),
                None => object.name,
            })
            .collect())
    }

    /// Deletes the object at `remote_path`, authenticating with the current
    /// session token.
    pub fn delete(&self, remote_path: &str) -> Result<String> {
        require(remote_path, "storage path")?;
        let token = self
            .session
            .token()
            .ok_or_else(|| FirekitError::required("session token"))?;
        debug!(remote_path, "deleting object");
        // The storage service acknowledges deletes with 204 No Content.
        let request = ApiRequest::new(Method::DELETE, self.object_url(remote_path))
            .bearer(token)
            .accept(response::OK_OR_NO_CONTENT);
        transport::execute(&self.runner, request)
    }

    fn object_url(&self, remote_path: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.storage_url.trim_end_matches('/'),
            self.bucket,
            urlencoding::encode(remote_path)
        )
    }
}

fn require(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(FirekitError::required(field_name))
    } else {
        Ok(())
    }
}
