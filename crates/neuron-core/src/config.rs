//! Immutable configuration value type (SPEC_FULL §3/§6).
//!
//! Loading this from a layered file + `NEURON_`-prefixed environment
//! overrides is explicitly out of scope for the core (spec §1) — that
//! mechanism lives in the outer CLI/config layer this crate doesn't own.
//! `Config::from_env` below is a minimal convenience so `neuron-node` has
//! something to construct a runnable `Config` from; it is not a general
//! layered loader.

use crate::constants::{
    DEFAULT_AUTH_TIMEOUT_MS, DEFAULT_AXON_BACKOFF_CEILING_MS, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_MAX_CONCURRENT_HANDSHAKES, DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_QUEUE_TIMEOUT_MS,
};
use crate::error::NeuronError;
use crate::npi::validate_npi;

#[derive(Clone, Debug)]
pub struct OrganizationConfig {
    pub npi: String,
    pub name: String,
    pub org_type: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct WebsocketConfig {
    pub path: String,
    pub max_concurrent_handshakes: usize,
    pub auth_timeout_ms: u64,
    pub queue_timeout_ms: u64,
    pub max_payload_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub path: String,
    pub enabled: bool,
}

#[derive(Clone, Debug)]
pub struct AxonConfig {
    pub registry_url: String,
    pub endpoint_url: String,
    pub backoff_ceiling_ms: u64,
    /// Provider NPIs this organization advertises to Axon (spec §4.9 step
    /// 3: "for each configured provider not yet registered"). Not part of
    /// spec §6's enumerated config keys — a deployment's outer config
    /// layer is free to source this however it likes; `from_env` reads a
    /// comma-separated list for the demo binary.
    pub provider_npis: Vec<String>,
}

/// The complete, validated configuration tree (spec §6). Constructed once at
/// startup, then shared read-only (`Arc<Config>`) for the lifetime of the
/// process — constructed once, then treated as immutable.
#[derive(Clone, Debug)]
pub struct Config {
    pub organization: OrganizationConfig,
    pub server: ServerConfig,
    pub websocket: WebsocketConfig,
    pub storage_path: String,
    pub audit: AuditConfig,
    pub heartbeat_interval_ms: u64,
    pub axon: AxonConfig,
}

impl Config {
    /// Validate cross-field invariants the loader can't express structurally
    /// (the NPI check digit, most notably). Called once after construction.
    pub fn validate(&self) -> Result<(), NeuronError> {
        validate_npi(&self.organization.npi)?;
        if self.websocket.max_concurrent_handshakes == 0 {
            return Err(NeuronError::ConfigInvalid(
                "websocket.max_concurrent_handshakes must be >= 1".into(),
            ));
        }
        if self.websocket.max_payload_bytes == 0 {
            return Err(NeuronError::ConfigInvalid(
                "websocket.max_payload_bytes must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Build a `Config` from `NEURON_`-prefixed environment variables with
    /// sensible defaults for everything else. Not a general layered config
    /// loader (that mechanism is out of scope per spec §1) — just enough to
    /// start the demo binary.
    pub fn from_env() -> Result<Self, NeuronError> {
        let npi = std::env::var("NEURON_ORGANIZATION__NPI")
            .map_err(|_| NeuronError::ConfigInvalid("NEURON_ORGANIZATION__NPI is required".into()))?;

        let cfg = Config {
            organization: OrganizationConfig {
                npi,
                name: env_or("NEURON_ORGANIZATION__NAME", "Unnamed Organization"),
                org_type: env_or("NEURON_ORGANIZATION__TYPE", "provider_group"),
            },
            server: ServerConfig {
                host: env_or("NEURON_SERVER__HOST", "0.0.0.0"),
                port: env_or("NEURON_SERVER__PORT", "8443")
                    .parse()
                    .map_err(|_| NeuronError::ConfigInvalid("server.port must be a u16".into()))?,
            },
            websocket: WebsocketConfig {
                path: env_or("NEURON_WEBSOCKET__PATH", "/ws/handshake"),
                max_concurrent_handshakes: parse_env(
                    "NEURON_WEBSOCKET__MAX_CONCURRENT_HANDSHAKES",
                    DEFAULT_MAX_CONCURRENT_HANDSHAKES,
                )?,
                auth_timeout_ms: parse_env("NEURON_WEBSOCKET__AUTH_TIMEOUT_MS", DEFAULT_AUTH_TIMEOUT_MS)?,
                queue_timeout_ms: parse_env(
                    "NEURON_WEBSOCKET__QUEUE_TIMEOUT_MS",
                    DEFAULT_QUEUE_TIMEOUT_MS,
                )?,
                max_payload_bytes: parse_env(
                    "NEURON_WEBSOCKET__MAX_PAYLOAD_BYTES",
                    DEFAULT_MAX_PAYLOAD_BYTES,
                )?,
            },
            storage_path: env_or("NEURON_STORAGE__PATH", "./data/store"),
            audit: AuditConfig {
                path: env_or("NEURON_AUDIT__PATH", "./data/audit.log"),
                enabled: env_or("NEURON_AUDIT__ENABLED", "true")
                    .parse()
                    .unwrap_or(true),
            },
            heartbeat_interval_ms: parse_env(
                "NEURON_HEARTBEAT__INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL_MS,
            )?,
            axon: AxonConfig {
                registry_url: env_or("NEURON_AXON__REGISTRY_URL", "https://axon.example.org"),
                endpoint_url: env_or("NEURON_AXON__ENDPOINT_URL", "https://neuron.example.org"),
                backoff_ceiling_ms: parse_env(
                    "NEURON_AXON__BACKOFF_CEILING_MS",
                    DEFAULT_AXON_BACKOFF_CEILING_MS,
                )?,
                provider_npis: env_or("NEURON_AXON__PROVIDER_NPIS", "")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
        };

        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, NeuronError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| NeuronError::ConfigInvalid(format!("{key} has an invalid value: {v}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            organization: OrganizationConfig {
                npi: "1234567893".into(),
                name: "Test Org".into(),
                org_type: "provider_group".into(),
            },
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8443,
            },
            websocket: WebsocketConfig {
                path: "/ws/handshake".into(),
                max_concurrent_handshakes: 10,
                auth_timeout_ms: 30_000,
                queue_timeout_ms: 30_000,
                max_payload_bytes: 65536,
            },
            storage_path: "./data/store".into(),
            audit: AuditConfig {
                path: "./data/audit.log".into(),
                enabled: true,
            },
            heartbeat_interval_ms: 60_000,
            axon: AxonConfig {
                registry_url: "https://axon.example.org".into(),
                endpoint_url: "https://neuron.example.org".into(),
                backoff_ceiling_ms: 300_000,
                provider_npis: vec!["1234567893".into()],
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn bad_npi_rejected() {
        let mut cfg = sample();
        cfg.organization.npi = "0000000000".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut cfg = sample();
        cfg.websocket.max_concurrent_handshakes = 0;
        assert!(cfg.validate().is_err());
    }
}
