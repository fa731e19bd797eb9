//! Session token service
//!
//! Issues and verifies compact signed session claims (HS256). Verification
//! is a pure function of the token and the server secret: no session store,
//! no revocation list. A token stays valid until `exp` even after logout;
//! the cookie clearing in the session layer is the only logout mechanism.

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};

/// Role carried in the session claims
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Admin => "admin",
        }
    }

    /// Parse the role column; anything unrecognized demotes to client.
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::Client,
        }
    }
}

/// Claims embedded in the session token. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Subject: the user id
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

/// Issues and verifies session tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `now >= exp` must fail immediately; the default leeway would keep
        // expired tokens alive for another minute.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_secs,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.session_secret, config.session_ttl_secs)
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a token for the given identity, expiring after the configured TTL.
    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
        name: &str,
    ) -> AppResult<(String, SessionClaims)> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            name: name.to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::seconds(self.ttl_secs as i64)).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign session token: {}", e)))?;

        Ok((token, claims))
    }

    /// Verify a token, failing closed.
    ///
    /// Malformed structure, a signature mismatch, and expiry all yield
    /// `None` ("no session") rather than an error that could leak past the
    /// boundary.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("a-test-secret-that-is-long-enough!!", 3600)
    }

    #[test]
    fn verify_returns_issued_claims_while_fresh() {
        let service = service();
        let user_id = Uuid::new_v4();

        let (token, issued) = service
            .issue(user_id, "reader@example.com", Role::Client, "Reader")
            .expect("issue should succeed");
        let verified = service.verify(&token).expect("token should verify");

        assert_eq!(verified, issued);
        assert_eq!(verified.sub, user_id);
        assert_eq!(verified.role, Role::Client);
    }

    #[test]
    fn expired_token_yields_no_session() {
        let service = TokenService::new("a-test-secret-that-is-long-enough!!", 0);

        let (token, _) = service
            .issue(Uuid::new_v4(), "reader@example.com", Role::Client, "Reader")
            .expect("issue should succeed");

        // exp == now, and now >= exp is expired
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(service.verify(&token).is_none());
    }

    #[test]
    fn tampered_signature_yields_no_session() {
        let service = service();
        let (token, _) = service
            .issue(Uuid::new_v4(), "reader@example.com", Role::Admin, "Admin")
            .expect("issue should succeed");

        // Flip a character in the signature segment
        let mut parts: Vec<String> = token.split('.').map(|s| s.to_string()).collect();
        assert_eq!(parts.len(), 3);
        let sig = parts[2].clone();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        parts[2] = format!("{}{}", flipped, &sig[1..]);

        assert!(service.verify(&parts.join(".")).is_none());
    }

    #[test]
    fn garbage_token_yields_no_session() {
        let service = service();
        assert!(service.verify("not-a-token").is_none());
        assert!(service.verify("a.b").is_none());
        assert!(service.verify("").is_none());
    }

    #[test]
    fn wrong_secret_yields_no_session() {
        let service = service();
        let other = TokenService::new("a-different-secret-also-long-enough", 3600);

        let (token, _) = service
            .issue(Uuid::new_v4(), "reader@example.com", Role::Client, "Reader")
            .expect("issue should succeed");

        assert!(other.verify(&token).is_none());
    }
}
