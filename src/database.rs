//! Realtime database operations.
//!
//! Paths are slash-separated locations in the hierarchical store, mapped to
//! `{database_url}/{path}.json` with the bearer token as an `auth` query
//! parameter.  Every operation validates its path before touching the
//! network and runs on the shared worker pool.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FirekitError, Result};
use crate::merge::{self, Incoming};
use crate::project::ProjectConfig;
use crate::runner::{self, TaskRunner};
use crate::transport::{self, ApiRequest};

/// Client for the realtime database.
pub struct Database {
    base_url: String,
    runner: Arc<dyn TaskRunner>,
}

impl Database {
    pub fn new(config: &ProjectConfig) -> Self {
        Self::with_runner(config, runner::shared_pool())
    }

    /// Creates a client with an explicit task runner, for callers and tests
    /// that want to control scheduling.
    pub fn with_runner(config: &ProjectConfig, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            base_url: config.database_url.clone(),
            runner,
        }
    }

    /// Reads the value stored at `path` and returns it as JSON text.
    ///
    /// An empty location answers with a null body, which surfaces as
    /// [`FirekitError::NoData`] rather than an empty success.
    pub fn read(&self, path: &str, token: &str) -> Result<String> {
        validate_path(path)?;
        debug!(path, "reading value");
        self.request(Method::GET, path, token, None)
    }

    /// Replaces the value at `path` with the single-field object
    /// `{key: value}`.  `value` must be a string or integer scalar.
    pub fn write(&self, path: &str, key: &str, value: Value, token: &str) -> Result<String> {
        validate_path(path)?;
        let payload = single_field(key, value)?;
        debug!(path, key, "writing value");
        self.request(Method::PUT, path, token, Some(payload))
    }

    /// Merges the single field `{key: value}` into the value at `path`,
    /// leaving the location's other fields alone.
    pub fn update(&self, path: &str, key: &str, value: Value, token: &str) -> Result<String> {
        validate_path(path)?;
        let payload = single_field(key, value)?;
        debug!(path, key, "updating value");
        self.request(Method::PATCH, path, token, Some(payload))
    }

    /// Adds a scalar to the value at `path`: a fresh path stores the scalar
    /// bare, a stored scalar is promoted to an array first, an array gets
    /// the scalar appended.
    ///
    /// The existing value is read immediately before the write with no
    /// atomicity between the two steps: two concurrent appends to the same
    /// path can interleave and lose one of the updates.  Serialize appends
    /// to a path externally if that matters.
    pub fn append(&self, path: &str, value: Value, token: &str) -> Result<String> {
        self.merge_in(path, Incoming::One(value), token)
    }

    /// Adds a sequence of scalars to the value at `path`.  Against a stored
    /// scalar or array this REPLACES the previous contents with an object
    /// keying the incoming values by position ("0", "1", ...); see
    /// [`crate::merge::resolve`].  Same read-modify-write caveat as
    /// [`Database::append`].
    pub fn append_many(&self, path: &str, values: Vec<Value>, token: &str) -> Result<String> {
        self.merge_in(path, Incoming::Many(values), token)
    }

    /// Removes the value at `path`.
    ///
    /// The backend acknowledges a completed delete with a null body, so a
    /// successful delete surfaces as [`FirekitError::NoData`]; any other
    /// error means the delete did not happen.
    pub fn delete(&self, path: &str, token: &str) -> Result<String> {
        validate_path(path)?;
        debug!(path, "deleting value");
        self.request(Method::DELETE, path, token, None)
    }

    /// Reads the keyed collection at `path` and returns only the members
    /// whose values are themselves objects; scalar members are discarded.
    pub fn list_as_objects(&self, path: &str, token: &str) -> Result<Map<String, Value>> {
        validate_path(path)?;
        let body = self.request(Method::GET, path, token, None)?;
        let value: Value = serde_json::from_str(&body)?;
        match value {
            Value::Object(members) => Ok(members
                .into_iter()
                .filter(|(_, member)| member.is_object())
                .collect()),
            _ => Err(FirekitError::UnexpectedShape),
        }
    }

    fn merge_in(&self, path: &str, incoming: Incoming, token: &str) -> Result<String> {
        validate_path(path)?;
        let existing = match self.request(Method::GET, path, token, None) {
            Ok(body) => Some(serde_json::from_str::<Value>(&body)?),
            Err(FirekitError::NoData) => None,
            Err(err) => return Err(err),
        };
        let next = merge::resolve(existing.as_ref(), incoming)?;
        debug!(path, "appending merged value");
        self.request(Method::PUT, path, token, Some(next.to_string()))
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<String>,
    ) -> Result<String> {
        let url = format!("{}/{}.json", self.base_url.trim_end_matches('/'), path);
        let mut request = ApiRequest::new(method, url).query("auth", token);
        if let Some(body) = body {
            request = request.json(body);
        }
        transport::execute(&self.runner, request)
    }
}

/// Paths are non-empty and restricted to letters, digits, `_`, `.`, `-`
/// and `/`.
pub(crate) fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(FirekitError::InvalidPath("must not be empty".to_string()));
    }
    for c in path.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '/' | '.' | '-') {
            return Err(FirekitError::InvalidPath(format!(
                "disallowed character {:?}",
                c
            )));
        }
    }
    Ok(())
}

fn single_field(key: &str, value: Value) -> Result<String> {
    if key.trim().is_empty() {
        return Err(FirekitError::required("key"));
    }
    if !merge::is_scalar(&value) {
        return Err(FirekitError::InvalidInput(
            "value must be a string or an integer".to_string(),
        ));
    }
    let mut payload = Map::new();
    payload.insert(key.to_string(), value);
    Ok(Value::Object(payload).to_string())
}
