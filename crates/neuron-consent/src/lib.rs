pub mod verify;

pub use verify::{verify_consent_token, ConsentClaims};
