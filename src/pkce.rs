use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::OAuthError;

const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 24;

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkcePair {
    pub fn generate() -> Result<Self, OAuthError> {
        Ok(Self::from_verifier(random_token(VERIFIER_BYTES)?))
    }

    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let digest = hasher.finalize();
        let code_challenge = URL_SAFE_NO_PAD.encode(digest);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

/// Opaque value for the `state` parameter.
pub(crate) fn generate_state() -> Result<String, OAuthError> {
    random_token(STATE_BYTES)
}

/// Url-safe, unpadded base64 of `len` bytes from the OS RNG.
pub fn random_token(len: usize) -> Result<String, OAuthError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| OAuthError::OsRng {
            message: err.to_string(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
