use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{OAuthError, PkcePair};

#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub state: String,
    pub pkce: Option<PkcePair>,
    pub scope: Option<String>,
}

impl AuthorizationRequest {
    /// What the host must keep until the provider redirects back.
    pub fn pending(&self) -> PendingAuthorization {
        PendingAuthorization {
            state: self.state.clone(),
            code_verifier: self.pkce.as_ref().map(|pkce| pkce.code_verifier.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: Option<String>,
}

/// Query parameters of the provider's redirect back to the callback URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

impl CallbackParams {
    pub fn from_url(callback_url: &str) -> Result<Self, OAuthError> {
        let url = Url::parse(callback_url)?;
        let mut params = Self::default();

        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                "error_uri" => params.error_uri = value,
                _ => {}
            }
        }

        Ok(params)
    }

    pub fn into_response(self) -> Result<AuthorizationResponse, OAuthError> {
        let code = self
            .code
            .filter(|code| !code.is_empty())
            .ok_or(OAuthError::MissingAuthorizationCode)?;
        Ok(AuthorizationResponse {
            code,
            state: self.state,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// RFC 6749 section 5.2 error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}
