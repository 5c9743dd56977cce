/// Authentication and authorization primitives
///
/// - `password`: Argon2id hashing and strength validation
/// - `jwt`: HS256 access/refresh token creation and validation
/// - `middleware`: axum bearer-token middleware and the per-request
///   `AuthContext` it injects
pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{create_token, validate_access_token, validate_refresh_token, Claims, TokenType};
pub use middleware::{AuthContext, AuthError};
pub use password::{hash_password, validate_password_strength, verify_password};
