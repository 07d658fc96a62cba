//! The Lidraughts login strategy.
//!
//! A [`Strategy`] wraps an [`OAuthClient`] configured for Lidraughts and
//! exposes the two steps a host web framework needs: [`Strategy::authorize`]
//! to start the redirect, and [`Strategy::authenticate`] to finish it when the
//! provider calls back.

mod config;
mod verify;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::types::TokenErrorResponse;
use crate::{
    AuthorizationRequest, CallbackParams, LidraughtsProvider, OAuthClient, OAuthError,
    OAuthProvider, PendingAuthorization, Profile, StrategyError, TokenResponse, profile,
};

pub use config::StrategyConfig;
pub use verify::Verify;

pub const PROVIDER_NAME: &str = "lidraughts";

const FETCH_PROFILE_FAILED: &str = "Failed to fetch user profile";
const PARSE_PROFILE_FAILED: &str = "Failed to parse user profile";
const TOKEN_FAILED: &str = "Failed to obtain access token";

/// Outcome of a successful callback.
#[derive(Debug, Clone)]
pub struct Authenticated<U> {
    pub user: U,
    pub tokens: TokenResponse,
}

pub struct Strategy<V> {
    oauth: OAuthClient<LidraughtsProvider>,
    user_profile_url: String,
    verify: V,
}

impl<V: Verify> Strategy<V> {
    pub fn new(config: StrategyConfig, verify: V) -> Result<Self, OAuthError> {
        Url::parse(&config.user_profile_url)?;
        let provider = LidraughtsProvider::new()
            .with_authorize_url(config.authorization_url.clone())
            .with_token_url(config.token_url.clone());
        let oauth = OAuthClient::new(provider, config.client_config())?;

        Ok(Self {
            oauth,
            user_profile_url: config.user_profile_url,
            verify,
        })
    }

    pub fn name(&self) -> &str {
        self.oauth.provider().id()
    }

    /// Builds the provider redirect. Keep [`AuthorizationRequest::pending`]
    /// until the callback arrives.
    pub fn authorize(&self) -> Result<AuthorizationRequest, OAuthError> {
        let request = self.oauth.authorization_url()?;
        debug!(
            provider = self.name(),
            pkce = request.pkce.is_some(),
            "redirecting to authorization endpoint"
        );
        Ok(request)
    }

    /// Completes the flow: checks the callback, exchanges the code, fetches
    /// the profile and runs the verify callback.
    pub async fn authenticate(
        &self,
        mut params: CallbackParams,
        pending: &PendingAuthorization,
    ) -> Result<Authenticated<V::User>, StrategyError> {
        if let Some(code) = params.error.take() {
            return Err(StrategyError::Authorization {
                code,
                message: params.error_description,
                uri: params.error_uri,
            });
        }

        let response = params.into_response().map_err(StrategyError::Callback)?;

        let tokens = self
            .oauth
            .exchange_code(
                response,
                pending.code_verifier.as_deref(),
                Some(&pending.state),
            )
            .await
            .map_err(token_error)?;

        let profile = self.user_profile(&tokens.access_token).await?;
        debug!(provider = self.name(), id = %profile.id, "fetched user profile");

        match self
            .verify
            .verify(tokens.clone(), profile)
            .await
            .map_err(StrategyError::Verify)?
        {
            Some(user) => Ok(Authenticated { user, tokens }),
            None => Err(StrategyError::Rejected),
        }
    }

    /// Fetches and normalizes the account of `access_token`'s owner.
    pub async fn user_profile(&self, access_token: &str) -> Result<Profile, StrategyError> {
        let body = self
            .oauth
            .get(&self.user_profile_url, access_token)
            .await
            .map_err(profile_fetch_error)?;

        let json: Value = serde_json::from_str(&body).map_err(|_| StrategyError::Parse {
            message: PARSE_PROFILE_FAILED.to_string(),
        })?;

        let identity = profile::parse(&json);
        Ok(Profile::new(PROVIDER_NAME, identity, body, json))
    }
}

/// A JSON body carrying `message` is reported as an API error; anything else
/// is a transport failure.
fn profile_fetch_error(err: OAuthError) -> StrategyError {
    if let OAuthError::HttpStatus { body, .. } = &err {
        if let Some(message) = api_message(body) {
            return StrategyError::Api { message };
        }
    }
    StrategyError::internal(FETCH_PROFILE_FAILED, err)
}

/// Any truthy `message` counts. Strings are taken as-is; other values are
/// reported in their JSON form.
fn api_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    match json.get("message")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(message) if message.is_empty() => None,
        Value::String(message) => Some(message.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn token_error(err: OAuthError) -> StrategyError {
    match err {
        OAuthError::StateMismatch { .. } | OAuthError::MissingAuthorizationCode => {
            StrategyError::Callback(err)
        }
        OAuthError::HttpStatus { ref body, .. } | OAuthError::InvalidResponse { ref body, .. } => {
            match serde_json::from_str::<TokenErrorResponse>(body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description,
                    error_uri,
                }) => StrategyError::Token {
                    code: error,
                    message: error_description,
                    uri: error_uri,
                },
                Err(_) => StrategyError::internal(TOKEN_FAILED, err),
            }
        }
        other => StrategyError::internal(TOKEN_FAILED, other),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::TcpListener;

    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const SCENARIO_BODY: &str = r#"{"id":"42","username":"alice","displayName":"Alice A.","profileUrl":"https://example/u/alice"}"#;

    async fn accept(_tokens: TokenResponse, profile: Profile) -> Result<Option<Profile>, Infallible> {
        Ok(Some(profile))
    }

    fn config_for(server: &MockServer) -> StrategyConfig {
        StrategyConfig::new("example.com", "http://localhost:5000/auth/lidraughts/callback")
            .with_authorization_url(format!("{}/oauth/authorize", server.uri()))
            .with_token_url(format!("{}/oauth", server.uri()))
            .with_user_profile_url(format!("{}/api/account", server.uri()))
    }

    async fn mount_profile(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/api/account"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn mount_token(server: &MockServer, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    fn pending(state: &str) -> PendingAuthorization {
        PendingAuthorization {
            state: state.to_string(),
            code_verifier: None,
        }
    }

    #[tokio::test]
    async fn user_profile_normalizes_response() {
        let server = MockServer::start().await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string(SCENARIO_BODY)).await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let profile = strategy.user_profile("token-123").await.unwrap();

        assert_eq!(profile.provider, "lidraughts");
        assert_eq!(profile.id, "42");
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.display_name, "Alice A.");
        assert_eq!(profile.profile_url, "https://example/u/alice");
        assert_eq!(profile.raw, SCENARIO_BODY);
        assert_eq!(profile.json["username"], "alice");
    }

    #[tokio::test]
    async fn user_profile_keeps_raw_body_verbatim() {
        let body = "{ \"id\" : \"7\",\n  \"username\":\"bob\" }";
        let server = MockServer::start().await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string(body)).await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let profile = strategy.user_profile("token-123").await.unwrap();

        assert_eq!(profile.raw, body);
        assert_eq!(profile.username, "bob");
    }

    #[tokio::test]
    async fn user_profile_reports_parse_failure_for_non_json() {
        let server = MockServer::start().await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string("not-json")).await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy.user_profile("token-123").await.unwrap_err();

        assert!(matches!(err, StrategyError::Parse { .. }));
        assert_eq!(err.to_string(), "Failed to parse user profile");
    }

    #[tokio::test]
    async fn user_profile_surfaces_provider_message() {
        let server = MockServer::start().await;
        mount_profile(
            &server,
            ResponseTemplate::new(401).set_body_string(r#"{"message":"No such token"}"#),
        )
        .await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy.user_profile("token-123").await.unwrap_err();

        match err {
            StrategyError::Api { message } => assert_eq!(message, "No such token"),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_profile_wraps_status_failure_without_message() {
        let server = MockServer::start().await;
        mount_profile(&server, ResponseTemplate::new(500).set_body_string("oops")).await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy.user_profile("token-123").await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to fetch user profile");
        match err {
            StrategyError::InternalOAuth {
                source: OAuthError::HttpStatus { status, body },
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(body, "oops");
            }
            other => panic!("expected internal oauth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_profile_ignores_error_body_without_message() {
        let server = MockServer::start().await;
        mount_profile(
            &server,
            ResponseTemplate::new(403).set_body_string(r#"{"error":"Missing scope"}"#),
        )
        .await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy.user_profile("token-123").await.unwrap_err();

        assert!(matches!(err, StrategyError::InternalOAuth { .. }));
    }

    #[tokio::test]
    async fn user_profile_wraps_connection_failure() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = StrategyConfig::new("example.com", "http://localhost:5000/cb")
            .with_user_profile_url(format!("http://127.0.0.1:{port}/api/account"));
        let strategy = Strategy::new(config, accept).unwrap();

        let err = strategy.user_profile("token-123").await.unwrap_err();

        assert!(matches!(
            err,
            StrategyError::InternalOAuth {
                source: OAuthError::Http(_),
                ..
            }
        ));
    }

    #[test]
    fn new_rejects_malformed_profile_url() {
        let config = StrategyConfig::new("example.com", "http://localhost:5000/cb")
            .with_user_profile_url("not a url");
        assert!(matches!(
            Strategy::new(config, accept),
            Err(OAuthError::Url(_))
        ));
    }

    #[test]
    fn name_is_lidraughts() {
        let config = StrategyConfig::new("example.com", "http://localhost:5000/cb");
        let strategy = Strategy::new(config, accept).unwrap();
        assert_eq!(strategy.name(), "lidraughts");
    }

    #[tokio::test]
    async fn authenticate_runs_full_flow() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(200)
                .set_body_string(r#"{"access_token":"token-123","token_type":"Bearer"}"#),
        )
        .await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string(SCENARIO_BODY)).await;
        let strategy = Strategy::new(
            config_for(&server).with_client_secret("shh"),
            |tokens: TokenResponse, profile: Profile| async move {
                assert_eq!(tokens.access_token, "token-123");
                Ok::<_, Infallible>(Some(profile.username))
            },
        )
        .unwrap();

        let request = strategy.authorize().unwrap();
        assert!(request.authorization_url.starts_with(&server.uri()));

        let authenticated = strategy
            .authenticate(callback("auth-code", &request.state), &request.pending())
            .await
            .unwrap();

        assert_eq!(authenticated.user, "alice");
        assert_eq!(authenticated.tokens.token_type.as_deref(), Some("Bearer"));
    }

    #[tokio::test]
    async fn authenticate_sends_pkce_verifier() {
        let server = MockServer::start().await;
        let strategy = Strategy::new(config_for(&server).with_pkce(true), accept).unwrap();
        let request = strategy.authorize().unwrap();
        let pending = request.pending();
        let verifier = pending.code_verifier.clone().unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth"))
            .and(body_string_contains(format!("code_verifier={verifier}").as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"access_token":"token-123"}"#),
            )
            .mount(&server)
            .await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string(SCENARIO_BODY)).await;

        let authenticated = strategy
            .authenticate(callback("auth-code", &request.state), &pending)
            .await
            .unwrap();

        assert_eq!(authenticated.user.username, "alice");
    }

    #[tokio::test]
    async fn authenticate_rejects_state_mismatch() {
        let server = MockServer::start().await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy
            .authenticate(callback("auth-code", "forged"), &pending("expected"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StrategyError::Callback(OAuthError::StateMismatch { .. })
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn authenticate_requires_code() {
        let server = MockServer::start().await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();
        let params = CallbackParams {
            state: Some("s".to_string()),
            ..Default::default()
        };

        let err = strategy.authenticate(params, &pending("s")).await.unwrap_err();

        assert!(matches!(
            err,
            StrategyError::Callback(OAuthError::MissingAuthorizationCode)
        ));
    }

    #[tokio::test]
    async fn authenticate_reports_denied_authorization() {
        let server = MockServer::start().await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("User declined".to_string()),
            state: Some("s".to_string()),
            ..Default::default()
        };

        let err = strategy.authenticate(params, &pending("s")).await.unwrap_err();

        assert!(err.is_access_denied());
        match err {
            StrategyError::Authorization { message, .. } => {
                assert_eq!(message.as_deref(), Some("User declined"))
            }
            other => panic!("expected authorization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn authenticate_maps_token_error_body() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(400).set_body_string(
                r#"{"error":"invalid_grant","error_description":"Code expired"}"#,
            ),
        )
        .await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy
            .authenticate(callback("auth-code", "s"), &pending("s"))
            .await
            .unwrap_err();

        match err {
            StrategyError::Token { code, message, .. } => {
                assert_eq!(code, "invalid_grant");
                assert_eq!(message.as_deref(), Some("Code expired"));
            }
            other => panic!("expected token error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn authenticate_wraps_opaque_token_failure() {
        let server = MockServer::start().await;
        mount_token(&server, ResponseTemplate::new(502).set_body_string("bad gateway")).await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy
            .authenticate(callback("auth-code", "s"), &pending("s"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to obtain access token");
        assert!(matches!(err, StrategyError::InternalOAuth { .. }));
    }

    #[tokio::test]
    async fn authenticate_reports_rejected_user() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(200).set_body_string(r#"{"access_token":"token-123"}"#),
        )
        .await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string(SCENARIO_BODY)).await;
        let strategy = Strategy::new(
            config_for(&server),
            |_tokens: TokenResponse, _profile: Profile| async {
                Ok::<Option<()>, Infallible>(None)
            },
        )
        .unwrap();

        let err = strategy
            .authenticate(callback("auth-code", "s"), &pending("s"))
            .await
            .unwrap_err();

        assert!(matches!(err, StrategyError::Rejected));
    }

    #[tokio::test]
    async fn authenticate_propagates_verify_failure() {
        let server = MockServer::start().await;
        mount_token(
            &server,
            ResponseTemplate::new(200).set_body_string(r#"{"access_token":"token-123"}"#),
        )
        .await;
        mount_profile(&server, ResponseTemplate::new(200).set_body_string(SCENARIO_BODY)).await;
        let strategy = Strategy::new(
            config_for(&server),
            |_tokens: TokenResponse, _profile: Profile| async {
                Err::<Option<()>, _>(std::io::Error::other("database unavailable"))
            },
        )
        .unwrap();

        let err = strategy
            .authenticate(callback("auth-code", "s"), &pending("s"))
            .await
            .unwrap_err();

        assert!(matches!(err, StrategyError::Verify(_)));
        assert!(err.to_string().contains("database unavailable"));
    }

    #[tokio::test]
    async fn custom_headers_reach_token_and_profile_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth"))
            .and(header("user-agent", "myapp.com"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"access_token":"token-123"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/account"))
            .and(header("authorization", "Bearer token-123"))
            .and(header("user-agent", "myapp.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SCENARIO_BODY))
            .expect(1)
            .mount(&server)
            .await;
        let strategy =
            Strategy::new(config_for(&server).with_user_agent("myapp.com"), accept).unwrap();

        let authenticated = strategy
            .authenticate(callback("auth-code", "s"), &pending("s"))
            .await
            .unwrap();

        assert_eq!(authenticated.user.username, "alice");
    }

    #[tokio::test]
    async fn user_profile_reports_non_string_message() {
        let server = MockServer::start().await;
        mount_profile(
            &server,
            ResponseTemplate::new(400).set_body_string(r#"{"message":{"text":"bad"}}"#),
        )
        .await;
        let strategy = Strategy::new(config_for(&server), accept).unwrap();

        let err = strategy.user_profile("token-123").await.unwrap_err();

        match err {
            StrategyError::Api { message } => assert_eq!(message, r#"{"text":"bad"}"#),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn falsy_messages_are_not_api_errors() {
        for body in [
            r#"{"message":""}"#,
            r#"{"message":null}"#,
            r#"{"message":false}"#,
            r#"{"message":0}"#,
            "oops",
        ] {
            assert_eq!(api_message(body), None, "{body}");
        }
        assert_eq!(api_message(r#"{"message":404}"#).as_deref(), Some("404"));
        assert_eq!(api_message(r#"{"message":true}"#).as_deref(), Some("true"));
    }
}
