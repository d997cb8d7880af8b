use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mediaup_api::auth::JwtClaims;

/// JWT secret used by the test app (at least 32 characters)
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-that-is-at-least-32-characters";

/// HS256 token for `user_id`, valid for an hour
pub fn token_for(user_id: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
        nbf: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to encode test token")
}

/// `Authorization` header value for `user_id`
pub fn bearer(user_id: &str) -> String {
    format!("Bearer {}", token_for(user_id))
}
