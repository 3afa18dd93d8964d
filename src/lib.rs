//! A rust client for the [Firebase] Auth, Realtime Database and Cloud
//! Storage REST APIs.
//!
//! [Firebase]: https://firebase.google.com/docs/reference/rest/database
//!
//! The API is synchronous in shape but never runs network I/O on the calling
//! thread: every operation is executed on a background worker and the caller
//! blocks only for its outcome.  Database and storage operations share a
//! bounded worker pool; identity operations run on a dedicated single-worker
//! queue so session-mutating calls are never reordered.
//!
//! To use the crate, describe your project and hand out facades:
//!
//! ```ignore
//! use serde_json::json;
//!
//! use firekit::project::{Project, ProjectConfig};
//!
//! let project = Project::initialize(ProjectConfig::new(
//!     "api-key",
//!     "my-app.firebaseapp.com",
//!     "https://my-app-default-rtdb.firebaseio.com",
//!     "my-app.appspot.com",
//! ));
//!
//! let auth = project.auth();
//! auth.sign_in("user@example.com", "hunter22")?;
//! let token = auth.current_token().unwrap_or_default();
//!
//! let db = project.database();
//! db.write("users/42", "name", json!("Kia"), &token)?;
//! let stored = db.read("users/42/name", &token)?;
//!
//! let storage = project.storage();
//! storage.upload("./avatar.png", "avatars/42.png")?;
//! ```
//!
//! Every operation returns a `Result`; there is no side-channel error state
//! to poll.  A location with nothing stored reads back as
//! [`FirekitError::NoData`] rather than an empty success, so "empty value"
//! and "no value" stay distinguishable.
//!
//! Appends read the existing value, merge, and write back with no atomicity
//! across the two steps.  Do not issue concurrent appends to the same path
//! without external serialization; see [`database::Database::append`].
//!
//! [`FirekitError::NoData`]: crate::error::FirekitError::NoData

pub mod auth;
pub mod database;
pub mod error;
pub mod merge;
pub mod project;
mod response;
pub mod runner;
pub mod storage;
mod transport;
