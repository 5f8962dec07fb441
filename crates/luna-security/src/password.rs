use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD as BASE64;
use luna_common::{Error, Result};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 password hashing.
///
/// Hashes are self-describing (`pbkdf2-sha256$<iterations>$<salt>$<hash>`) so
/// the iteration count can be raised without invalidating stored passwords.
#[derive(Clone)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| Error::Config("password iterations must be non-zero".into()))?;
        Ok(Self {
            iterations,
            rng: SystemRandom::new(),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| Error::Security("failed to generate salt".into()))?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            password.as_bytes(),
            &mut hash,
        );

        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            BASE64.encode(salt),
            BASE64.encode(hash)
        ))
    }

    /// Constant-time check of `password` against an encoded hash.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool> {
        let parsed = ParsedHash::parse(encoded)?;
        Ok(pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            parsed.iterations,
            &parsed.salt,
            password.as_bytes(),
            &parsed.hash,
        )
        .is_ok())
    }

    /// True when the stored hash used fewer iterations than currently configured.
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        ParsedHash::parse(encoded)
            .map(|parsed| parsed.iterations < self.iterations)
            .unwrap_or(true)
    }
}

struct ParsedHash {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl ParsedHash {
    fn parse(encoded: &str) -> Result<Self> {
        let invalid = || Error::Security("malformed password hash".into());

        let mut parts = encoded.split('$');
        if parts.next() != Some(SCHEME) {
            return Err(invalid());
        }
        let iterations = parts
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .and_then(NonZeroU32::new)
            .ok_or_else(invalid)?;
        let salt = parts
            .next()
            .and_then(|s| BASE64.decode(s).ok())
            .ok_or_else(invalid)?;
        let hash = parts
            .next()
            .and_then(|s| BASE64.decode(s).ok())
            .ok_or_else(invalid)?;
        if parts.next().is_some() || hash.len() != HASH_LEN {
            return Err(invalid());
        }

        Ok(Self {
            iterations,
            salt,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::PasswordHasher;

    fn hasher(iterations: u32) -> PasswordHasher {
        PasswordHasher::new(iterations).expect("valid iterations")
    }

    #[test]
    fn hash_then_verify() {
        let hasher = hasher(1_000);
        let encoded = hasher.hash("correct horse battery").unwrap();

        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("correct horse battery", &encoded).unwrap());
        assert!(!hasher.verify("wrong horse", &encoded).unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = hasher(1_000);
        let a = hasher.hash("secret-password").unwrap();
        let b = hasher.hash("secret-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_uses_iterations_from_the_hash() {
        let old = hasher(500).hash("secret-password").unwrap();
        let current = hasher(2_000);
        assert!(current.verify("secret-password", &old).unwrap());
        assert!(current.needs_rehash(&old));
        assert!(!hasher(500).needs_rehash(&old));
    }

    #[test]
    fn malformed_hashes_are_errors() {
        let hasher = hasher(1_000);
        assert!(hasher.verify("x", "plaintext").is_err());
        assert!(hasher.verify("x", "pbkdf2-sha256$0$AAAA$AAAA").is_err());
        assert!(PasswordHasher::new(0).is_err());
    }
}
