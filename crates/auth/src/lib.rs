//! `registrar-auth`: identity and credentials.
//!
//! Users and roles, bearer-token claims, and the credential seams
//! (`JwtValidator`, `TokenIssuer`, `PasswordHasher`). Decoupled from HTTP and
//! storage.

pub mod claims;
pub mod jwt;
pub mod password;
pub mod roles;
pub mod user;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator, TokenError, TokenIssuer};
pub use password::{PasswordHasher, Sha256PasswordHasher};
pub use roles::Role;
pub use user::{
    ChangeRole, RegisterUser, RegistrationForm, UpdateProfile, User, UserCommand, UserEvent,
};
