//! Signed session tokens.
//!
//! Compact JWS with HS256: `base64url(header).base64url(claims).base64url(mac)`.
//! The claims name the user (`sub`) and carry a random `jti`, so two logins in
//! the same second still produce different tokens. A valid signature is not
//! enough on its own: the session manager also requires the token to be the
//! one currently stored for that user.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LEN: usize = 32;
const ALG: &str = "HS256";
const TYP: &str = "JWT";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid subject")]
    InvalidSubject,
    #[error("invalid key")]
    Key,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    /// # Errors
    /// Returns `TokenError::InvalidSubject` if `sub` is not a UUID.
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::InvalidSubject)
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn random_jti() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

/// SHA-256 of a raw token; the only form a token is ever persisted in.
#[must_use]
pub fn digest(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Compare two byte strings without an early exit on the first difference.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Clone, Debug)]
pub struct TokenSigner {
    secret: SecretString,
    ttl_seconds: i64,
}

impl TokenSigner {
    /// # Errors
    /// Returns `TokenError::WeakSecret` if the secret is shorter than [`MIN_SECRET_LEN`].
    pub fn new(secret: SecretString, ttl_seconds: i64) -> Result<Self, TokenError> {
        if secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret);
        }
        Ok(Self {
            secret,
            ttl_seconds,
        })
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| TokenError::Key)
    }

    /// Mint a token for `user_id`, issued at `now` (unix seconds).
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded or signed.
    pub fn issue_at(&self, user_id: Uuid, now: i64) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALG.to_string(),
            typ: TYP.to_string(),
        };
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl_seconds),
            jti: random_jti(),
        };

        let signing_input = format!("{}.{}", b64e_json(&header)?, b64e_json(&claims)?);
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded or signed.
    pub fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.issue_at(user_id, chrono::Utc::now().timestamp())
    }

    /// Verify the signature and expiry, then return the claims.
    ///
    /// # Errors
    /// Any malformed, tampered or expired token.
    pub fn decode_at(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::TokenFormat);
        };

        let signature =
            Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| TokenError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let claims: SessionClaims = b64d_json(claims_b64)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// # Errors
    /// Any malformed, tampered or expired token.
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.decode_at(token, chrono::Utc::now().timestamp())
    }
}

#[cfg(test)]
pub(crate) fn test_signer() -> TokenSigner {
    TokenSigner {
        secret: SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
        ttl_seconds: 3600,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn issue_then_decode() -> Result<()> {
        let signer = test_signer();
        let user_id = Uuid::new_v4();
        let token = signer.issue_at(user_id, 1_000)?;

        let claims = signer.decode_at(&token, 1_001)?;
        assert_eq!(claims.user_id()?, user_id);
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp, 4_600);
        Ok(())
    }

    #[test]
    fn tokens_are_unique_per_issue() -> Result<()> {
        let signer = test_signer();
        let user_id = Uuid::new_v4();
        let first = signer.issue_at(user_id, 1_000)?;
        let second = signer.issue_at(user_id, 1_000)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn rejects_expired_token() -> Result<()> {
        let signer = test_signer();
        let token = signer.issue_at(Uuid::new_v4(), 1_000)?;
        assert!(matches!(
            signer.decode_at(&token, 4_600),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn rejects_other_secret() -> Result<()> {
        let token = test_signer().issue_at(Uuid::new_v4(), 1_000)?;
        let other = TokenSigner::new(
            SecretString::from("ffffffffffffffffffffffffffffffff".to_string()),
            3600,
        )?;
        assert!(matches!(
            other.decode_at(&token, 1_001),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_tampered_claims() -> Result<()> {
        let signer = test_signer();
        let token = signer.issue_at(Uuid::new_v4(), 1_000)?;
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = SessionClaims {
            sub: Uuid::new_v4().to_string(),
            iat: 1_000,
            exp: 9_999,
            jti: "x".to_string(),
        };
        let forged = format!("{}.{}.{}", parts[0], b64e_json(&forged_claims)?, parts[2]);
        assert!(matches!(
            signer.decode_at(&forged, 1_001),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        let signer = test_signer();
        for garbage in ["", "abc", "a.b", "a.b.c", "a.b.c.d", "!!.??.**"] {
            assert!(signer.decode_at(garbage, 0).is_err(), "accepted {garbage:?}");
        }
    }

    #[test]
    fn weak_secret_rejected() {
        assert!(matches!(
            TokenSigner::new(SecretString::from("short".to_string()), 60),
            Err(TokenError::WeakSecret)
        ));
    }

    #[test]
    fn digest_is_stable_and_distinct() {
        assert_eq!(digest("token"), digest("token"));
        assert_ne!(digest("token"), digest("other"));
        assert_eq!(digest("token").len(), 32);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
