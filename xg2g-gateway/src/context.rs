//! Request-scoped identity and cancellation.
//!
//! A [`RequestContext`] is built once per HTTP request and passed explicitly
//! to every component call. Nothing here is stored in globals or task-locals.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Maximum accepted length of a client correlation ID.
pub const MAX_CORRELATION_ID_LENGTH: usize = 128;

/// Principal used when the request carried no credentials.
pub const ANONYMOUS: &str = "anonymous";

/// Principal of a caller that presented the configured API token.
pub const API_CLIENT: &str = "api-client";

/// Reasons a client correlation ID is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationIdRejection {
    #[error("correlation ID is empty")]
    Empty,
    #[error("correlation ID exceeds 128 characters")]
    TooLong,
    #[error("correlation ID contains non-ASCII characters")]
    NonAscii,
    #[error("correlation ID contains disallowed character {0:?}")]
    DisallowedChar(char),
}

/// Validate a client-supplied correlation ID.
///
/// Returns `Ok(None)` when nothing was supplied.
pub fn sanitize_correlation_id(value: Option<&str>) -> Result<Option<String>, CorrelationIdRejection> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CorrelationIdRejection::Empty);
    }
    if trimmed.len() > MAX_CORRELATION_ID_LENGTH {
        return Err(CorrelationIdRejection::TooLong);
    }
    for ch in trimmed.chars() {
        if !ch.is_ascii() {
            return Err(CorrelationIdRejection::NonAscii);
        }
        if !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':')) {
            return Err(CorrelationIdRejection::DisallowedChar(ch));
        }
    }
    Ok(Some(trimmed.to_string()))
}

/// Fresh server-side correlation ID.
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identity and cancellation of one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    /// The correlation ID came from the client rather than being generated.
    pub correlation_supplied: bool,
    pub principal: String,
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Create a context with a generated correlation ID.
    pub fn new() -> Self {
        Self {
            correlation_supplied: false,
            ..Self::with_correlation_id(generate_correlation_id())
        }
    }

    /// Create a context for a known correlation ID.
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            correlation_supplied: true,
            principal: ANONYMOUS.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a context from client inputs. The header wins over the body value.
    pub fn from_client(
        header: Option<&str>,
        body: Option<&str>,
    ) -> Result<Self, CorrelationIdRejection> {
        let supplied = match sanitize_correlation_id(header)? {
            Some(id) => Some(id),
            None => sanitize_correlation_id(body)?,
        };
        Ok(match supplied {
            Some(id) => Self::with_correlation_id(id),
            None => Self::new(),
        })
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = principal.into();
        self
    }

    /// Whether the caller has gone away.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
