pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtError, JwtService};
pub use middleware::{require_jwt, session_cookie, token_from_headers, AuthUser, JWT_COOKIE};
