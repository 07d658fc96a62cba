use std::collections::HashMap;
use std::time::Duration;

use reqwest::{
    Client, RequestBuilder,
    header::{AUTHORIZATION, HeaderName, HeaderValue},
};
use tracing::debug;
use url::Url;

use crate::{
    AuthorizationRequest, AuthorizationResponse, OAuthError, OAuthProvider, PkcePair,
    TokenResponse, pkce,
};

const ACCESS_TOKEN_PARAM: &str = "access_token";

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: Option<String>,
    /// Sent with every token and resource request.
    pub custom_headers: Vec<(String, String)>,
    /// Send the access token as `Authorization: Bearer` on GETs instead of
    /// an `access_token` query parameter.
    pub use_authorization_header_for_get: bool,
    pub pkce: bool,
    pub timeout: Option<Duration>,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scope: None,
            custom_headers: Vec::new(),
            use_authorization_header_for_get: false,
            pkce: false,
            timeout: None,
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_pkce(mut self, enabled: bool) -> Self {
        self.pkce = enabled;
        self
    }

    pub fn with_authorization_header_for_get(mut self, enabled: bool) -> Self {
        self.use_authorization_header_for_get = enabled;
        self
    }

    pub fn with_custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient<P: OAuthProvider> {
    provider: P,
    config: OAuthClientConfig,
    http: Client,
}

impl<P: OAuthProvider> OAuthClient<P> {
    pub fn new(provider: P, config: OAuthClientConfig) -> Result<Self, OAuthError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Url::parse(provider.authorize_url())?;
        Url::parse(provider.token_url())?;
        Url::parse(&config.redirect_uri)?;
        Ok(Self {
            provider,
            config,
            http,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn authorization_url(&self) -> Result<AuthorizationRequest, OAuthError> {
        self.authorization_url_with_state(None)
    }

    pub fn authorization_url_with_state(
        &self,
        state: Option<String>,
    ) -> Result<AuthorizationRequest, OAuthError> {
        let pkce = if self.config.pkce {
            Some(PkcePair::generate()?)
        } else {
            None
        };
        let state = match state {
            Some(state) => state,
            None => pkce::generate_state()?,
        };
        let scope = self
            .config
            .scope
            .clone()
            .filter(|scope| !scope.is_empty());

        let mut params: HashMap<String, String> = HashMap::new();
        params.insert("response_type".to_string(), "code".to_string());
        params.insert("client_id".to_string(), self.config.client_id.clone());
        params.insert("redirect_uri".to_string(), self.config.redirect_uri.clone());
        params.insert("state".to_string(), state.clone());
        if let Some(scope) = &scope {
            params.insert("scope".to_string(), scope.clone());
        }
        if let Some(pkce) = &pkce {
            params.insert("code_challenge".to_string(), pkce.code_challenge.clone());
            params.insert("code_challenge_method".to_string(), "S256".to_string());
        }

        let mut url = Url::parse(self.provider.authorize_url())?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(&key, &value);
            }
        }

        Ok(AuthorizationRequest {
            authorization_url: url.to_string(),
            state,
            pkce,
            scope,
        })
    }

    pub async fn exchange_code(
        &self,
        response: AuthorizationResponse,
        code_verifier: Option<&str>,
        expected_state: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let AuthorizationResponse { code, state } = response;
        check_state(expected_state, state.as_deref())?;

        let mut payload = HashMap::new();
        payload.insert("grant_type".to_string(), "authorization_code".to_string());
        payload.insert("code".to_string(), code);
        payload.insert("client_id".to_string(), self.config.client_id.clone());
        payload.insert("redirect_uri".to_string(), self.config.redirect_uri.clone());

        if let Some(secret) = &self.config.client_secret {
            payload.insert("client_secret".to_string(), secret.clone());
        }

        if let Some(verifier) = code_verifier {
            payload.insert("code_verifier".to_string(), verifier.to_string());
        }

        self.send_token_request(payload).await
    }

    /// GET a protected resource with the access token attached.
    ///
    /// Returns the body as text. Non-2xx responses become
    /// [`OAuthError::HttpStatus`] carrying the response body.
    pub async fn get(&self, resource_url: &str, access_token: &str) -> Result<String, OAuthError> {
        let mut url = Url::parse(resource_url)?;
        let mut builder = if self.config.use_authorization_header_for_get {
            let value = HeaderValue::from_str(&format!("Bearer {access_token}")).map_err(|_| {
                OAuthError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    value: "Bearer <redacted>".to_string(),
                }
            })?;
            self.http.get(url).header(AUTHORIZATION, value)
        } else {
            url.query_pairs_mut()
                .append_pair(ACCESS_TOKEN_PARAM, access_token);
            self.http.get(url)
        };
        builder = apply_headers(builder, &self.config.custom_headers)?;

        debug!(provider = self.provider.id(), url = resource_url, "fetching protected resource");
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OAuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn send_token_request(
        &self,
        payload: HashMap<String, String>,
    ) -> Result<TokenResponse, OAuthError> {
        let mut builder = self.http.post(self.provider.token_url());
        builder = apply_headers(builder, &self.provider.token_headers())?;
        builder = apply_headers(builder, &self.config.custom_headers)?;

        debug!(provider = self.provider.id(), "exchanging authorization code");
        let response = builder.form(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OAuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let token = serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
            message: err.to_string(),
            body,
        })?;

        Ok(token)
    }
}

fn check_state(expected: Option<&str>, returned: Option<&str>) -> Result<(), OAuthError> {
    match (expected, returned) {
        (Some(expected), Some(returned)) if expected == returned => Ok(()),
        (Some(expected), returned) => Err(OAuthError::StateMismatch {
            expected: expected.to_string(),
            received: returned.unwrap_or_default().to_string(),
        }),
        (None, _) => Ok(()),
    }
}

fn apply_headers(
    mut builder: RequestBuilder,
    headers: &[(String, String)],
) -> Result<RequestBuilder, OAuthError> {
    for (name, value) in headers {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| OAuthError::InvalidHeader {
                name: name.clone(),
                value: value.clone(),
            })?;
        let value = HeaderValue::from_str(value).map_err(|_| OAuthError::InvalidHeader {
            name: name.to_string(),
            value: value.clone(),
        })?;
        builder = builder.header(name, value);
    }
    Ok(builder)
}
