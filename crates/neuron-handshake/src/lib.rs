pub mod admission;
pub mod challenge;
pub mod engine;
pub mod message;

pub use admission::{Admission, AdmissionGate, OwnedAdmission};
pub use challenge::ChallengeStore;
pub use engine::{EngineConfig, Frame, HandshakeEngine, HandshakeOutcome, HandshakeTransport};
pub use message::{CompletionStatus, InboundMessage, OutboundMessage};
