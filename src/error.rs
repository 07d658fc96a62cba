use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the generic OAuth 2.0 client.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("missing authorization code in callback")]
    MissingAuthorizationCode,

    #[error("state mismatch (expected={expected}, received={received})")]
    StateMismatch { expected: String, received: String },
}

/// Terminal failure of one authentication attempt.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Transport or protocol failure talking to the provider.
    #[error("{message}")]
    InternalOAuth {
        message: String,
        #[source]
        source: OAuthError,
    },

    /// The provider answered with an error message of its own.
    #[error("{message}")]
    Api { message: String },

    #[error("{message}")]
    Parse { message: String },

    /// The provider redirected back with an `error` parameter.
    #[error("authorization failed ({code}): {}", message.as_deref().unwrap_or("no description"))]
    Authorization {
        code: String,
        message: Option<String>,
        uri: Option<String>,
    },

    /// The token endpoint answered with an RFC 6749 error body.
    #[error("token request failed ({code}): {}", message.as_deref().unwrap_or("no description"))]
    Token {
        code: String,
        message: Option<String>,
        uri: Option<String>,
    },

    #[error("invalid callback: {0}")]
    Callback(#[source] OAuthError),

    #[error("user rejected by verify callback")]
    Rejected,

    #[error("verify callback failed: {0}")]
    Verify(#[source] BoxError),
}

impl StrategyError {
    pub(crate) fn internal(message: impl Into<String>, source: OAuthError) -> Self {
        Self::InternalOAuth {
            message: message.into(),
            source,
        }
    }

    /// True when the user declined the authorization prompt.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::Authorization { code, .. } if code == "access_denied")
    }
}
