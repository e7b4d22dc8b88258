pub mod claims;
pub mod jwk_cache;
pub mod projection;
pub mod token;
pub mod validator;

pub use claims::{Audience, Claims, ValidatedClaims};
pub use jwk_cache::{Jwk, JwksCache, JwksCacheConfig, KeySet};
pub use projection::ClaimProjection;
pub use token::{at_hash_for, SignatureValidated, Token, TokenState, Unvalidated, Validated, ValidationPolicy};
pub use validator::{extract_bearer, TokenVerifier};
