pub mod log;

pub use log::{AuditLog, VerifyError, VerifyReport};
