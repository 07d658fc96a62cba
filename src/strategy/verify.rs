use std::future::Future;

use crate::{BoxError, Profile, TokenResponse};

/// Turns a fetched profile into the host application's user.
///
/// `Ok(None)` rejects the login without it being an error. Implemented for
/// any `Fn(TokenResponse, Profile) -> impl Future<Output = Result<Option<U>, E>>`.
pub trait Verify: Send + Sync {
    type User: Send;

    fn verify(
        &self,
        tokens: TokenResponse,
        profile: Profile,
    ) -> impl Future<Output = Result<Option<Self::User>, BoxError>> + Send;
}

impl<F, Fut, U, E> Verify for F
where
    F: Fn(TokenResponse, Profile) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<U>, E>> + Send,
    U: Send,
    E: Into<BoxError>,
{
    type User = U;

    fn verify(
        &self,
        tokens: TokenResponse,
        profile: Profile,
    ) -> impl Future<Output = Result<Option<U>, BoxError>> + Send {
        let fut = (self)(tokens, profile);
        async move { fut.await.map_err(Into::into) }
    }
}
