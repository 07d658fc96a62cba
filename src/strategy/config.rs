use std::time::Duration;

use crate::OAuthClientConfig;
use crate::providers::{DEFAULT_AUTHORIZE_URL, DEFAULT_PROFILE_URL, DEFAULT_TOKEN_URL};

const DEFAULT_SCOPE_SEPARATOR: &str = " ";

/// Settings for [`Strategy`](crate::Strategy).
///
/// Only the client id and callback URL are required; the endpoints default to
/// lidraughts.org.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub authorization_url: String,
    pub token_url: String,
    pub user_profile_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub callback_url: String,
    pub scope: Vec<String>,
    pub scope_separator: String,
    pub custom_headers: Vec<(String, String)>,
    pub pkce: bool,
    pub timeout: Option<Duration>,
}

impl StrategyConfig {
    pub fn new(client_id: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            authorization_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            user_profile_url: DEFAULT_PROFILE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: None,
            callback_url: callback_url.into(),
            scope: Vec::new(),
            scope_separator: DEFAULT_SCOPE_SEPARATOR.to_string(),
            custom_headers: Vec::new(),
            pkce: false,
            timeout: None,
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_authorization_url(mut self, url: impl Into<String>) -> Self {
        self.authorization_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_user_profile_url(mut self, url: impl Into<String>) -> Self {
        self.user_profile_url = url.into();
        self
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_scope_separator(mut self, separator: impl Into<String>) -> Self {
        self.scope_separator = separator.into();
        self
    }

    pub fn with_custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    /// Lidraughts asks API clients to identify themselves, e.g. with the
    /// application's domain name.
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_custom_header("User-Agent", user_agent)
    }

    pub fn with_pkce(mut self, enabled: bool) -> Self {
        self.pkce = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn joined_scope(&self) -> String {
        self.scope.join(&self.scope_separator)
    }

    pub(crate) fn client_config(&self) -> OAuthClientConfig {
        let mut config = OAuthClientConfig::new(self.client_id.clone(), self.callback_url.clone())
            .with_scope(self.joined_scope())
            .with_pkce(self.pkce)
            .with_authorization_header_for_get(true);
        if let Some(secret) = &self.client_secret {
            config = config.with_client_secret(secret.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config.custom_headers = self.custom_headers.clone();
        config
    }
}
