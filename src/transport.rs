//! The one HTTP-operation path every facade goes through.
//!
//! A facade method describes its remote operation as an [`ApiRequest`]
//! (verb, URL, query, payload, accepted statuses) and hands it to
//! [`execute`], which runs the round trip on a [`TaskRunner`] worker and
//! interprets the drained response.  All three facades are thin builders
//! over this seam.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;

use crate::error::Result;
use crate::response::{self, interpret};
use crate::runner::TaskRunner;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to create HTTP client")
});

enum Payload {
    Json(String),
    Octets(Bytes),
}

/// One remote operation, ready to dispatch.
pub(crate) struct ApiRequest {
    method: Method,
    url: String,
    query: Vec<(&'static str, String)>,
    payload: Option<Payload>,
    bearer: Option<String>,
    accept: &'static [u16],
}

impl ApiRequest {
    pub fn new(method: Method, url: String) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            payload: None,
            bearer: None,
            accept: response::OK,
        }
    }

    pub fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    pub fn json(mut self, body: String) -> Self {
        self.payload = Some(Payload::Json(body));
        self
    }

    pub fn octets(mut self, body: Bytes) -> Self {
        self.payload = Some(Payload::Octets(body));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn accept(mut self, statuses: &'static [u16]) -> Self {
        self.accept = statuses;
        self
    }

    /// Performs the round trip on the current thread and interprets the
    /// outcome.  Transport faults surface as task execution errors.
    fn dispatch(self) -> Result<String> {
        let mut request = HTTP_CLIENT.request(self.method, &self.url);
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }
        match self.payload {
            Some(Payload::Json(body)) => {
                request = request.header(CONTENT_TYPE, "application/json").body(body);
            }
            Some(Payload::Octets(body)) => {
                request = request
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(body);
            }
            None => {}
        }
        if let Some(token) = self.bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let rsp = request.send()?;
        let status = rsp.status().as_u16();
        // text() drains the body either way; on failure statuses this is the
        // error body.
        let body = rsp.text()?;
        interpret(status, body, self.accept)
    }
}

/// Submits the request's round trip to `runner` and waits for the outcome.
pub(crate) fn execute(runner: &Arc<dyn TaskRunner>, request: ApiRequest) -> Result<String> {
    runner.submit(Box::new(move || request.dispatch()))
}
