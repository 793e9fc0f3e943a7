pub mod identity;
pub mod jwt;
pub mod middleware;

pub use identity::{CallerIdentity, IdentityResolver};
pub use jwt::{Claims, JwtIdentityResolver};
pub use middleware::AuthLayer;
