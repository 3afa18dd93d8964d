//! Project configuration and the crate entry point.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{Auth, Session};
use crate::database::Database;
use crate::error::{ErrorKind, Result};
use crate::runner;
use crate::storage::Storage;

const IDENTITY_API_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const STORAGE_API_URL: &str = "https://firebasestorage.googleapis.com/v0";

/// Remote project credentials and endpoints.
///
/// The identity and storage endpoints default to the public services but can
/// be pointed elsewhere, via the environment or by assigning the fields.
/// This is not normally needed but can be used for testing purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub database_url: String,
    pub storage_bucket: String,
    pub identity_url: String,
    pub storage_url: String,
}

impl ProjectConfig {
    pub fn new(
        api_key: impl Into<String>,
        auth_domain: impl Into<String>,
        database_url: impl Into<String>,
        storage_bucket: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            auth_domain: auth_domain.into(),
            database_url: database_url.into(),
            storage_bucket: storage_bucket.into(),
            identity_url: env::var("FIREKIT_IDENTITY_URL")
                .unwrap_or_else(|_| IDENTITY_API_URL.to_string()),
            storage_url: env::var("FIREKIT_STORAGE_URL")
                .unwrap_or_else(|_| STORAGE_API_URL.to_string()),
        }
    }
}

/// One remote project and the session shared by its facades.
///
/// Construction performs no I/O; use [`Project::verify_credentials`] to
/// prove the configuration against the live service.
pub struct Project {
    config: ProjectConfig,
    session: Session,
}

// The probe account used to verify credentials; created on demand and
// deleted again immediately.
const PROBE_EMAIL: &str = "test@example.com";
const PROBE_PASSWORD: &str = "test1234";

impl Project {
    pub fn initialize(config: ProjectConfig) -> Self {
        Self {
            config,
            session: Session::default(),
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// The session shared by this project's facades.
    pub fn session(&self) -> Session {
        self.session.clone()
    }

    /// An identity client sharing this project's session.
    pub fn auth(&self) -> Auth {
        Auth::with_session(&self.config, self.session.clone())
    }

    /// A database client for this project.
    pub fn database(&self) -> Database {
        Database::new(&self.config)
    }

    /// A storage client sharing this project's session.
    pub fn storage(&self) -> Storage {
        Storage::new(&self.config, self.session.clone())
    }

    /// Proves the API key against the identity service by signing in a
    /// throwaway probe account, creating it first if it does not exist, and
    /// deleting it afterwards.  The probe runs on a scratch session and
    /// never touches this project's session.
    pub fn verify_credentials(&self) -> Result<()> {
        debug!("verifying project credentials");
        let auth = Auth::new(&self.config);
        match auth.sign_in(PROBE_EMAIL, PROBE_PASSWORD) {
            Ok(_) => {}
            Err(err) => match err.kind() {
                Some(ErrorKind::InvalidCredentials) | Some(ErrorKind::EmailNotFound) => {
                    match auth.sign_up(PROBE_EMAIL, PROBE_PASSWORD) {
                        Ok(_) => {}
                        // Lost a race with another verifier; the account is
                        // there after all.
                        Err(err) if err.kind() == Some(ErrorKind::EmailExists) => {
                            auth.sign_in(PROBE_EMAIL, PROBE_PASSWORD)?;
                        }
                        Err(err) => return Err(err),
                    }
                }
                _ => return Err(err),
            },
        }
        if let Some(token) = auth.current_token() {
            auth.delete_account(&token)?;
        }
        Ok(())
    }

    /// Shuts down the process-wide worker pools.  In-flight operations
    /// finish; every facade call made afterwards fails fast.
    pub fn shutdown() {
        runner::shutdown();
    }
}

#[cfg(test)]
mod tests {
    use all_asserts::assert_true;
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn test_config(server: &mockito::ServerGuard) -> ProjectConfig {
        let mut config = ProjectConfig::new(
            "test-key",
            "example.firebaseapp.com",
            "https://db.example.com",
            "bucket.appspot.com",
        );
        config.identity_url = server.url();
        config.storage_url = server.url();
        config
    }

    #[test]
    fn facades_share_the_project_session() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"idToken": "tok-1"}).to_string())
            .create();

        let project = Project::initialize(test_config(&server));
        assert_true!(project.session().token().is_none());

        project.auth().sign_in("a@example.com", "hunter22").unwrap();
        assert_eq!(project.session().token().unwrap(), "tok-1");
    }

    #[test]
    fn verify_credentials_creates_the_probe_account_when_missing() {
        let mut server = mockito::Server::new();
        let sign_in = server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"INVALID_LOGIN_CREDENTIALS"}}"#)
            .create();
        let sign_up = server
            .mock("POST", "/accounts:signUp")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"email": PROBE_EMAIL})))
            .with_status(200)
            .with_body(json!({"idToken": "probe-tok"}).to_string())
            .create();
        let delete = server
            .mock("POST", "/accounts:delete")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"idToken": "probe-tok"})))
            .with_status(200)
            .with_body("{}")
            .create();

        let project = Project::initialize(test_config(&server));
        project.verify_credentials().unwrap();

        sign_in.assert();
        sign_up.assert();
        delete.assert();
        // The probe ran on a scratch session.
        assert_true!(project.session().token().is_none());
    }

    #[test]
    fn verify_credentials_surfaces_unexpected_failures() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid"}}"#)
            .create();

        let project = Project::initialize(test_config(&server));
        let err = project.verify_credentials().unwrap_err();
        assert_true!(err.to_string().contains("HTTP Error 400"));
    }
}
