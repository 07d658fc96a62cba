mod lidraughts;

pub use crate::provider::OAuthProvider;
pub use lidraughts::LidraughtsProvider;
pub(crate) use lidraughts::{DEFAULT_AUTHORIZE_URL, DEFAULT_PROFILE_URL, DEFAULT_TOKEN_URL};
