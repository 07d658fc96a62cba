use crate::OAuthProvider;

// References:
// - https://lidraughts.org/api#section/Authentication

pub(crate) const DEFAULT_AUTHORIZE_URL: &str = "https://oauth.lidraughts.org/oauth/authorize";
pub(crate) const DEFAULT_TOKEN_URL: &str = "https://oauth.lidraughts.org/oauth";
pub(crate) const DEFAULT_PROFILE_URL: &str = "https://lidraughts.org/api/account";

#[derive(Debug, Clone)]
pub struct LidraughtsProvider {
    authorize_url: String,
    token_url: String,
}

impl Default for LidraughtsProvider {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

impl OAuthProvider for LidraughtsProvider {
    fn id(&self) -> &str {
        "lidraughts"
    }

    fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    fn token_url(&self) -> &str {
        &self.token_url
    }

    fn token_headers(&self) -> Vec<(String, String)> {
        vec![("Accept".to_string(), "application/json".to_string())]
    }
}

impl LidraughtsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}
