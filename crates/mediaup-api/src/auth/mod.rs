//! Bearer-token authentication
//!
//! Tokens are HS256 JWTs; the `sub` claim is the id of the user that owns upload sessions.

pub mod middleware;
pub mod models;

pub use middleware::{auth_middleware, AuthState};
pub use models::{AuthUser, JwtClaims};
