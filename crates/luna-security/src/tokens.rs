use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use luna_common::{Error, Result, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

const ISSUER: &str = "luna";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub kind: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> UserId {
        UserId::from_raw(self.sub.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Issues and verifies HS256 bearer tokens. Access and refresh tokens use
/// separate secrets and carry their kind, so neither can stand in for the other.
#[derive(Clone)]
pub struct TokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue_pair(&self, user_id: &UserId, email: &str) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, email, TokenKind::Access)?,
            refresh_token: self.issue(user_id, email, TokenKind::Refresh)?,
            token_type: "Bearer",
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn issue(&self, user_id: &UserId, email: &str, kind: TokenKind) -> Result<String> {
        let now = Utc::now();
        let (key, ttl) = match kind {
            TokenKind::Access => (&self.access_encoding, self.access_ttl),
            TokenKind::Refresh => (&self.refresh_encoding, self.refresh_ttl),
        };
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            kind,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| Error::Security(format!("failed to sign token: {e}")))
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims> {
        self.verify(token, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims> {
        let key = match expected {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, key, &validation).map_err(|e| {
            debug!("token rejected: {e}");
            Error::Unauthorized("invalid or expired token".into())
        })?;

        if data.claims.kind != expected {
            return Err(Error::Unauthorized("wrong token type".into()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenIssuer, TokenKind};
    use chrono::Duration;
    use luna_common::{Error, UserId};

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            "access-secret",
            "refresh-secret",
            Duration::minutes(15),
            Duration::days(7),
        )
    }

    #[test]
    fn issued_pair_verifies() {
        let issuer = issuer();
        let user = UserId::from_raw("user-1");
        let pair = issuer.issue_pair(&user, "a@example.com").unwrap();

        let claims = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.user_id(), user);
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(pair.expires_in, 900);

        let refresh = issuer.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer
            .issue_pair(&UserId::from_raw("user-1"), "a@example.com")
            .unwrap();

        assert!(matches!(
            issuer.verify_access(&pair.refresh_token),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            issuer.verify_refresh(&pair.access_token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let expired = TokenIssuer::new(
            "access-secret",
            "refresh-secret",
            Duration::seconds(-120),
            Duration::days(7),
        );
        let token = expired
            .issue(&UserId::from_raw("u"), "u@example.com", TokenKind::Access)
            .unwrap();
        assert!(issuer().verify_access(&token).is_err());

        let foreign = TokenIssuer::new("other", "other-refresh", Duration::minutes(5), Duration::days(1));
        let token = foreign
            .issue(&UserId::from_raw("u"), "u@example.com", TokenKind::Access)
            .unwrap();
        assert!(issuer().verify_access(&token).is_err());
        assert!(issuer().verify_access("not-a-jwt").is_err());
    }
}
