use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_id: Option<String>,
}

/// Verifies HS256 access tokens signed with the shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_config(config: &AppConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.leeway = config.auth_clock_skew.as_secs();
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = config.jwt_issuer.as_deref() {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let decoded = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;

        let claims = decoded.claims;
        if claims.sub.trim().is_empty() {
            return Err(AppError::unauthorized("Token subject is missing"));
        }

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            session_id: claims.session_id.or(claims.jti),
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    jti: Option<String>,
    session_id: Option<String>,
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use super::*;
    use crate::config::tests::{test_config, TEST_SECRET};

    pub(crate) fn token_for(user_id: &str, issuer: &str, exp_offset_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "sub": user_id,
            "iss": issuer,
            "iat": now,
            "exp": now + exp_offset_secs,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn verifier_accepts_valid_token() {
        let verifier = JwtVerifier::from_config(&test_config());
        let token = token_for("user-1", "habitsync-test", 300);

        let user = verifier.verify_access_token(&token).unwrap();
        assert_eq!(user.user_id, "user-1");
        assert!(user.session_id.is_none());
    }

    #[test]
    fn verifier_rejects_expired_token() {
        let verifier = JwtVerifier::from_config(&test_config());
        let token = token_for("user-1", "habitsync-test", -3_600);

        let err = verifier.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn verifier_rejects_wrong_issuer() {
        let verifier = JwtVerifier::from_config(&test_config());
        let token = token_for("user-1", "someone-else", 300);

        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn verifier_rejects_foreign_signature() {
        let verifier = JwtVerifier::from_config(&test_config());
        let now = chrono::Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({ "sub": "user-1", "iss": "habitsync-test", "exp": now + 300 }),
            &EncodingKey::from_secret(b"another-secret-of-sufficient-length!!"),
        )
        .unwrap();

        assert!(verifier.verify_access_token(&token).is_err());
    }

    #[test]
    fn verifier_rejects_blank_subject() {
        let verifier = JwtVerifier::from_config(&test_config());
        let token = token_for("  ", "habitsync-test", 300);

        let err = verifier.verify_access_token(&token).unwrap_err();
        assert!(err.to_string().contains("subject"));
    }
}
