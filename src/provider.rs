/// Endpoints and request shaping for one OAuth 2.0 provider.
pub trait OAuthProvider: Send + Sync {
    fn id(&self) -> &str;
    fn authorize_url(&self) -> &str;
    fn token_url(&self) -> &str;

    fn token_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}
