//! Identity operations: accounts, sessions and tokens.
//!
//! Every operation posts to the identity service and runs on the
//! single-worker identity queue, so calls that mutate the session are never
//! reordered relative to each other.  The bearer token obtained by signing
//! in is held in a [`Session`], which the storage facade shares.

use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{FirekitError, Result};
use crate::project::ProjectConfig;
use crate::runner::{self, TaskRunner};
use crate::transport::{self, ApiRequest};

/// The current bearer token, shared between facades.
///
/// Cloning a `Session` clones the handle, not the token: every clone sees
/// sign-in and sign-out through every other.
#[derive(Clone, Default)]
pub struct Session {
    token: Arc<Mutex<Option<String>>>,
}

// Custom implementation of Debug to avoid printing the token
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked = self.token().map(|_| "**********");
        f.debug_struct("Session").field("token", &masked).finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current bearer token, if signed in.
    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    pub(crate) fn set(&self, token: String) {
        *self.token.lock().unwrap() = Some(token);
    }

    pub(crate) fn clear(&self) {
        *self.token.lock().unwrap() = None;
    }
}

/// Client for the identity service.
pub struct Auth {
    api_key: String,
    identity_url: String,
    session: Session,
    runner: Arc<dyn TaskRunner>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(rename = "idToken")]
    id_token: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Deserialize)]
struct AccountInfo {
    #[serde(rename = "localId")]
    local_id: Option<String>,
    #[serde(rename = "emailVerified", default)]
    email_verified: bool,
}

impl Auth {
    /// Creates a client with its own fresh session.
    pub fn new(config: &ProjectConfig) -> Self {
        Self::with_session(config, Session::default())
    }

    /// Creates a client that reads and writes an existing session.
    pub fn with_session(config: &ProjectConfig, session: Session) -> Self {
        Self::with_runner(config, session, runner::identity_pool())
    }

    /// Creates a client with an explicit task runner, for callers and tests
    /// that want to control scheduling.
    pub fn with_runner(
        config: &ProjectConfig,
        session: Session,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        Self {
            api_key: config.api_key.clone(),
            identity_url: config.identity_url.clone(),
            session,
            runner,
        }
    }

    /// The session this client mutates.
    pub fn session(&self) -> Session {
        self.session.clone()
    }

    /// The current session token, if signed in.
    pub fn current_token(&self) -> Option<String> {
        self.session.token()
    }

    /// Creates an account and signs it in: on success the returned token
    /// becomes the current session token.  Returns the raw response body.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<String> {
        require(email, "email")?;
        require(password, "password")?;
        debug!(email, "signing up");
        let body = self.post(
            "signUp",
            json!({"email": email, "password": password, "returnSecureToken": true}),
        )?;
        self.remember_token(&body);
        Ok(body)
    }

    /// Signs in with email and password; on success the returned token
    /// becomes the current session token, replacing any previous one.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<String> {
        require(email, "email")?;
        require(password, "password")?;
        debug!(email, "signing in");
        let body = self.post(
            "signInWithPassword",
            json!({"email": email, "password": password, "returnSecureToken": true}),
        )?;
        self.remember_token(&body);
        Ok(body)
    }

    /// Clears the current session token.  Local only; the token itself is
    /// not revoked.
    pub fn sign_out(&self) {
        self.session.clear();
    }

    /// Sends a password-reset email.
    pub fn send_password_reset(&self, email: &str) -> Result<String> {
        require(email, "email")?;
        self.post(
            "sendOobCode",
            json!({"requestType": "PASSWORD_RESET", "email": email}),
        )
    }

    /// Sends a verification email to the account behind `id_token`.
    pub fn send_email_verification(&self, id_token: &str) -> Result<String> {
        require(id_token, "id token")?;
        self.post(
            "sendOobCode",
            json!({"requestType": "VERIFY_EMAIL", "idToken": id_token}),
        )
    }

    /// Whether the account behind `id_token` has verified its email address.
    pub fn is_email_verified(&self, id_token: &str) -> Result<bool> {
        Ok(self.lookup(id_token)?.email_verified)
    }

    /// The unique user id of the account behind `id_token`.
    pub fn lookup_user_id(&self, id_token: &str) -> Result<String> {
        self.lookup(id_token)?.local_id.ok_or_else(|| {
            FirekitError::Task("account lookup response had no localId".to_string())
        })
    }

    /// Deletes the account behind `id_token`.  If that token is the current
    /// session token, the session is cleared.
    pub fn delete_account(&self, id_token: &str) -> Result<String> {
        require(id_token, "id token")?;
        let body = self.post("delete", json!({"idToken": id_token}))?;
        if self.session.token().as_deref() == Some(id_token) {
            self.session.clear();
        }
        Ok(body)
    }

    fn lookup(&self, id_token: &str) -> Result<AccountInfo> {
        require(id_token, "id token")?;
        let body = self.post("lookup", json!({"idToken": id_token}))?;
        let parsed: LookupResponse = serde_json::from_str(&body)?;
        parsed
            .users
            .into_iter()
            .next()
            .ok_or_else(|| FirekitError::Task("account lookup returned no users".to_string()))
    }

    fn post(&self, operation: &str, payload: serde_json::Value) -> Result<String> {
        let url = format!(
            "{}/accounts:{}",
            self.identity_url.trim_end_matches('/'),
            operation
        );
        let request = ApiRequest::new(Method::POST, url)
            .query("key", self.api_key.clone())
            .json(payload.to_string());
        transport::execute(&self.runner, request)
    }

    fn remember_token(&self, body: &str) {
        if let Ok(response) = serde_json::from_str::<TokenResponse>(body) {
            self.session.set(response.id_token);
        }
    }
}

fn require(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(FirekitError::required(field_name))
    } else {
        Ok(())
    }
}

/// These unit tests run against a mock identity server.
#[cfg(test)]
mod tests {
    use all_asserts::{assert_false, assert_true};
    use mockito::{Matcher, ServerGuard};

    use crate::error::ErrorKind;
    use crate::runner::InlineRunner;

    use super::*;

    fn test_auth(server: &ServerGuard) -> Auth {
        let mut config = ProjectConfig::new(
            "test-key",
            "example.firebaseapp.com",
            "https://db.example.com",
            "bucket.appspot.com",
        );
        config.identity_url = server.url();
        Auth::with_runner(&config, Session::default(), Arc::new(InlineRunner::new()))
    }

    fn token_body(token: &str) -> String {
        json!({"idToken": token, "email": "a@example.com", "localId": "u1"}).to_string()
    }

    #[test]
    fn sign_in_stores_the_returned_token() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
            .match_body(Matcher::PartialJson(json!({"email": "a@example.com"})))
            .with_status(200)
            .with_body(token_body("tok-1"))
            .create();

        let auth = test_auth(&server);
        assert_true!(auth.current_token().is_none());

        auth.sign_in("a@example.com", "hunter22").unwrap();
        assert_eq!(auth.current_token().unwrap(), "tok-1");

        mock.assert();
    }

    #[test]
    fn second_sign_in_overwrites_the_first_token() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"email": "a@example.com"})))
            .with_status(200)
            .with_body(token_body("tok-1"))
            .create();
        server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"email": "b@example.com"})))
            .with_status(200)
            .with_body(token_body("tok-2"))
            .create();

        let auth = test_auth(&server);
        auth.sign_in("a@example.com", "hunter22").unwrap();
        auth.sign_in("b@example.com", "hunter22").unwrap();
        assert_eq!(auth.current_token().unwrap(), "tok-2");
    }

    #[test]
    fn sign_up_conflict_is_classified() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:signUp")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"EMAIL_EXISTS"}}"#)
            .create();

        let auth = test_auth(&server);
        let err = auth.sign_up("a@example.com", "hunter22").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::EmailExists));
        assert_true!(err.to_string().contains("HTTP Error 400"));
        assert_true!(auth.current_token().is_none());
    }

    #[test]
    fn empty_arguments_fail_before_any_request() {
        let mut server = mockito::Server::new();
        let mock = server.mock("POST", Matcher::Any).expect(0).create();

        let auth = test_auth(&server);
        assert_true!(matches!(
            auth.sign_in("", "pw").unwrap_err(),
            FirekitError::InvalidInput(_)
        ));
        assert_true!(matches!(
            auth.sign_in("a@example.com", "   ").unwrap_err(),
            FirekitError::InvalidInput(_)
        ));
        assert_true!(matches!(
            auth.send_password_reset("").unwrap_err(),
            FirekitError::InvalidInput(_)
        ));

        mock.assert();
    }

    #[test]
    fn lookup_parses_the_first_user() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:lookup")
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"idToken": "tok-1"})))
            .with_status(200)
            .with_body(
                json!({"users": [{"localId": "user-7", "emailVerified": true}]}).to_string(),
            )
            .create();

        let auth = test_auth(&server);
        assert_eq!(auth.lookup_user_id("tok-1").unwrap(), "user-7");
        assert_true!(auth.is_email_verified("tok-1").unwrap());
    }

    #[test]
    fn lookup_with_no_users_is_a_task_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:lookup")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"users": []}"#)
            .create();

        let auth = test_auth(&server);
        let err = auth.lookup_user_id("tok-1").unwrap_err();
        assert_true!(err.to_string().starts_with("task execution error: "));
    }

    #[test]
    fn delete_account_clears_a_matching_session() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(token_body("tok-1"))
            .create();
        server
            .mock("POST", "/accounts:delete")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{}")
            .create();

        let auth = test_auth(&server);
        auth.sign_in("a@example.com", "hunter22").unwrap();
        auth.delete_account("tok-1").unwrap();
        assert_true!(auth.current_token().is_none());
    }

    #[test]
    fn sign_out_clears_the_session_locally() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/accounts:signInWithPassword")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(token_body("tok-1"))
            .create();

        let auth = test_auth(&server);
        auth.sign_in("a@example.com", "hunter22").unwrap();
        assert_false!(auth.current_token().is_none());
        auth.sign_out();
        assert_true!(auth.current_token().is_none());
    }

    #[test]
    fn session_debug_masks_the_token() {
        let session = Session::new();
        session.set("very-secret".to_string());
        let printed = format!("{:?}", session);
        assert_false!(printed.contains("very-secret"));
    }
}
