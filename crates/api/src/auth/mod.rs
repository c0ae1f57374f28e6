//! Authentication and authorization

pub mod extract;
pub mod jwt;
pub mod password;

pub use extract::AuthUser;
pub use jwt::{Claims, JwtError, JwtManager};
pub use password::{hash_password, verify_password, PasswordError};
