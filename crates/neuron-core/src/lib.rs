pub mod config;
pub mod constants;
pub mod error;
pub mod npi;
pub mod types;

pub use config::Config;
pub use constants::*;
pub use error::NeuronError;
pub use npi::validate_npi;
pub use types::*;
