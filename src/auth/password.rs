//! # Password hashing and verification (Argon2id)
//!
//! - [`Hasher::hash`] draws a fresh salt from [`OsRng`], hashes with the
//!   configured work factor and returns a PHC string such as
//!   `$argon2id$v=19$m=19456,t=2,p=1$...`. Salt and parameters travel inside
//!   the string, so two hashes of one password never match byte for byte.
//! - [`Hasher::verify`] re-derives with the embedded salt and parameters.
//!   `Ok(false)` on mismatch, `Err` if the stored value is not a PHC string.
//!
//! Both run on the blocking pool; argon2 is deliberately slow.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash as PhcString, PasswordHasher as _, PasswordVerifier as _,
        SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::AuthError;

/// A stored password hash. Never holds plaintext: values come from
/// [`Hasher::hash`] or are loaded back from the store.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap a value read from persistence.
    #[must_use]
    pub(crate) fn from_stored(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}

#[derive(Clone, Debug)]
pub struct Hasher {
    params: Params,
}

impl Default for Hasher {
    fn default() -> Self {
        Self {
            params: Params::DEFAULT,
        }
    }
}

impl Hasher {
    /// Build a hasher with an explicit memory cost (KiB) and iteration count.
    ///
    /// # Errors
    /// Returns an error if argon2 rejects the parameters.
    pub fn with_work_factor(memory_kib: u32, iterations: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| AuthError::Internal(format!("invalid argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if hashing fails; callers must abort the write.
    pub async fn hash(&self, password: &SecretString) -> Result<PasswordHash, AuthError> {
        let params = self.params.clone();
        let password = password.clone();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::argon2(params)
                .hash_password(password.expose_secret().as_bytes(), &salt)
                .map(|hash| PasswordHash(hash.to_string()))
                .map_err(|e| AuthError::Internal(format!("failed to hash password: {e}")))
        })
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))?
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if the stored hash cannot be parsed.
    pub async fn verify(
        &self,
        password: &SecretString,
        hash: &PasswordHash,
    ) -> Result<bool, AuthError> {
        let password = password.clone();
        let hash = hash.clone();

        tokio::task::spawn_blocking(move || {
            let parsed = PhcString::new(hash.as_str())
                .map_err(|e| AuthError::Internal(format!("invalid password hash: {e}")))?;
            Ok(Argon2::default()
                .verify_password(password.expose_secret().as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?
    }

    /// Write-path rule for the password field: a new plaintext is always
    /// hashed, no new plaintext keeps the current hash untouched.
    ///
    /// # Errors
    /// `Validation` when there is neither a new password nor a current hash,
    /// or any hashing error.
    pub async fn prepare_for_save(
        &self,
        current: Option<PasswordHash>,
        new_password: Option<&SecretString>,
    ) -> Result<PasswordHash, AuthError> {
        match (new_password, current) {
            (Some(password), _) => {
                if password.expose_secret().is_empty() {
                    return Err(AuthError::Validation("password must not be empty"));
                }
                self.hash(password).await
            }
            (None, Some(current)) => Ok(current),
            (None, None) => Err(AuthError::Validation("password is required")),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Hasher {
    Hasher::with_work_factor(1024, 1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn hash_verifies_and_is_salted() -> Result<()> {
        let hasher = test_hasher();
        let password = secret("secret");

        let first = hasher.hash(&password).await?;
        let second = hasher.hash(&password).await?;

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("$argon2id$"));
        assert!(!first.as_str().contains("secret"));
        assert!(hasher.verify(&password, &first).await?);
        assert!(hasher.verify(&password, &second).await?);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() -> Result<()> {
        let hasher = test_hasher();
        let hash = hasher.hash(&secret("secret")).await?;
        assert!(!hasher.verify(&secret("wrong"), &hash).await?);
        assert!(!hasher.verify(&secret(""), &hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn verify_uses_embedded_parameters() -> Result<()> {
        let strong = Hasher::with_work_factor(2048, 2)?;
        let hash = strong.hash(&secret("secret")).await?;
        assert!(hash.as_str().contains("m=2048,t=2"));
        // A differently configured hasher still verifies old hashes.
        assert!(test_hasher().verify(&secret("secret"), &hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn verify_errors_on_malformed_hash() {
        let hasher = test_hasher();
        let bogus = PasswordHash::from_stored("plaintext".to_string());
        assert!(matches!(
            hasher.verify(&secret("plaintext"), &bogus).await,
            Err(AuthError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn prepare_for_save_hashes_new_and_keeps_current() -> Result<()> {
        let hasher = test_hasher();
        let current = hasher.hash(&secret("old")).await?;

        let kept = hasher.prepare_for_save(Some(current.clone()), None).await?;
        assert_eq!(kept, current);

        let changed = hasher
            .prepare_for_save(Some(current.clone()), Some(&secret("new")))
            .await?;
        assert_ne!(changed, current);
        assert!(hasher.verify(&secret("new"), &changed).await?);

        assert!(matches!(
            hasher.prepare_for_save(None, None).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            hasher.prepare_for_save(None, Some(&secret(""))).await,
            Err(AuthError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn work_factor_rejects_invalid_memory() {
        assert!(Hasher::with_work_factor(1, 1).is_err());
    }

    #[test]
    fn debug_redacts_hash() {
        let hash = PasswordHash::from_stored("$argon2id$v=19$m=8,t=1,p=1$abc$def".to_string());
        assert_eq!(format!("{hash:?}"), "PasswordHash([REDACTED])");
    }
}
