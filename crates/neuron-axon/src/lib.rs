pub mod client;
pub mod heartbeat;
pub mod registrar;
pub mod snapshot;

pub use client::{AxonClient, OrganizationEnrollRequest, OrganizationEnrollResponse};
pub use heartbeat::{AxonHeartbeat, HeartbeatConfig, HeartbeatSnapshot};
pub use registrar::{ensure_registered, RegistrarConfig};
pub use snapshot::{add_provider, organization_snapshot, remove_provider, OrganizationSnapshot};
