use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    name: String,
    iat: i64,
    exp: i64,
}

/// The identity a validated credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Issues and validates the opaque credential tokens clients present at
/// login, on REST calls, and on every WebSocket frame. Validation is a
/// pure function: signature + expiry check, then subject extraction.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        self.issue_at(user_id, username, current_unix_timestamp()?)
    }

    fn issue_at(&self, user_id: Uuid, username: &str, issued_at: i64) -> anyhow::Result<String> {
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            name: username.to_owned(),
            iat: issued_at,
            exp: issued_at + ACCESS_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode access token")
    }

    pub fn validate(&self, token: &str) -> anyhow::Result<Identity> {
        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode access token")?
            .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .with_context(|| format!("access token subject '{}' is not a UUID", claims.sub))?;

        if claims.name.is_empty() {
            return Err(anyhow!("access token carries an empty username claim"));
        }

        Ok(Identity { user_id, username: claims.name })
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}

#[cfg(test)]
mod tests {
    use super::{current_unix_timestamp, TokenService, ACCESS_TOKEN_TTL_SECONDS};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde::Serialize;
    use uuid::Uuid;

    const TEST_SECRET: &str = "tabula_test_secret_that_is_definitely_long_enough";

    #[test]
    fn rejects_short_secrets() {
        assert!(TokenService::new("too-short").is_err());
    }

    #[test]
    fn issues_and_validates_tokens() {
        let service = TokenService::new(TEST_SECRET).expect("service should initialize");
        let user_id = Uuid::new_v4();

        let token = service.issue(user_id, "alice").expect("token should be issued");
        let identity = service.validate(&token).expect("token should validate");

        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn rejects_tampered_tokens() {
        let service = TokenService::new(TEST_SECRET).expect("service should initialize");
        let token = service.issue(Uuid::new_v4(), "alice").expect("token should be issued");
        let tampered = format!("{token}x");

        assert!(service.validate(&tampered).is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let service = TokenService::new(TEST_SECRET).expect("service should initialize");
        let issued_at = current_unix_timestamp().expect("current timestamp should resolve")
            - ACCESS_TOKEN_TTL_SECONDS
            - 1;
        let token =
            service.issue_at(Uuid::new_v4(), "alice", issued_at).expect("token should be issued");

        assert!(service.validate(&token).is_err());
    }

    #[test]
    fn rejects_tokens_with_invalid_subject_claim() {
        #[derive(Serialize)]
        struct InvalidSubjectClaims {
            sub: &'static str,
            name: &'static str,
            iat: i64,
            exp: i64,
        }

        let service = TokenService::new(TEST_SECRET).expect("service should initialize");
        let now = current_unix_timestamp().expect("current timestamp should resolve");
        let claims = InvalidSubjectClaims {
            sub: "not-a-uuid",
            name: "alice",
            iat: now,
            exp: now + ACCESS_TOKEN_TTL_SECONDS,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("token should encode");

        assert!(service.validate(&token).is_err());
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let issuer = TokenService::new("another_secret_that_is_also_32_chars_long!")
            .expect("service should initialize");
        let validator = TokenService::new(TEST_SECRET).expect("service should initialize");

        let token = issuer.issue(Uuid::new_v4(), "alice").expect("token should be issued");
        assert!(validator.validate(&token).is_err());
    }
}
