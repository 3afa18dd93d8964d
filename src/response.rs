//! Interpretation of completed HTTP exchanges.
//!
//! Every facade funnels its responses through [`interpret`], which owns the
//! status-code policy: an accepted status with a real body is a success,
//! everything else is a classified failure.  Stateless, no I/O.

use crate::error::{ErrorKind, FirekitError, Result};

/// Accepted statuses for the common case.
pub(crate) const OK: &[u16] = &[200];

/// Accepted statuses for storage deletes, which the backend acknowledges
/// with No Content.
pub(crate) const OK_OR_NO_CONTENT: &[u16] = &[200, 204];

/// Turns a status code and fully-drained body into the operation's outcome.
///
/// `body` is the response text, which for failure statuses is the error body.
/// A body of exactly `"null"` at an accepted status is a failure: the server
/// answers that way when there is no data at the requested location.
pub(crate) fn interpret(status: u16, body: String, accept: &[u16]) -> Result<String> {
    if !accept.contains(&status) {
        let kind = ErrorKind::classify(status, &body);
        return Err(FirekitError::Http { status, kind, body });
    }
    if body == "null" {
        return Err(FirekitError::NoData);
    }
    Ok(body)
}
