pub mod canonical;
pub mod signing;

pub use canonical::{canonical_hash, canonicalize, sha256_hex};
pub use signing::{
    decode_public_key, decode_signature, encode_public_key, encode_signature, verify_signature,
    NeuronSigner, SignatureError,
};
