pub mod error;
pub mod middleware;
pub mod request;
pub mod signer;
pub mod token;

// Re-export public types and functions
pub use error::GrantError;
pub use middleware::{GrantState, USER_ID_HEADER, media_auth_middleware};
pub use request::{
    CreateGrantRequest, CreateGrantResponse, CreateStreamGrantRequest, CreateStreamGrantResponse,
};
pub use signer::{GrantSigner, MIN_SECRET_LENGTH, SIGNATURE_LENGTH};
pub use token::{GrantClaims, GrantManager, IssuedGrant, clamp_expiry};
