//! Lidraughts login over OAuth 2.0.
//!
//! [`Strategy`] drives the authorization-code flow against lidraughts.org and
//! normalizes the account response into a [`Profile`]. The generic
//! [`OAuthClient`] underneath does the protocol work; the strategy only
//! supplies endpoints, token placement and the profile mapping. Sessions and
//! routing stay with the host web framework.

mod client;
mod error;
mod pkce;
pub mod profile;
mod provider;
mod providers;
mod strategy;
mod types;

pub use client::{OAuthClient, OAuthClientConfig};
pub use error::{BoxError, OAuthError, StrategyError};
pub use pkce::{PkcePair, random_token};
pub use profile::{Identity, Profile};
pub use providers::{LidraughtsProvider, OAuthProvider};
pub use strategy::{Authenticated, PROVIDER_NAME, Strategy, StrategyConfig, Verify};
pub use types::{
    AuthorizationRequest, AuthorizationResponse, CallbackParams, PendingAuthorization,
    TokenResponse,
};
