//! neuron-node — the Neuron organization-boundary broker binary.
//!
//! Startup sequence:
//!   1. Load configuration from the environment
//!   2. Open (or recover) the relationship store and the hash-chained audit log
//!   3. Start the Axon registration + heartbeat loop
//!   4. Start the handshake WebSocket server
//!   5. Await a shutdown signal, then drain both in turn

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use neuron_axon::{AxonClient, AxonHeartbeat, HeartbeatConfig, RegistrarConfig};
use neuron_core::constants::CHALLENGE_STORE_CAPACITY;
use neuron_core::Config;
use neuron_handshake::{AdmissionGate, ChallengeStore, EngineConfig, HandshakeEngine};
use neuron_server::ProtocolServer;
use neuron_store::{RelationshipStore, StateDb};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,neuron=debug".parse().unwrap()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    info!(organization_npi = %config.organization.npi, "Neuron broker starting");

    // ── Relationship store ─────────────────────────────────────────────────
    if let Some(parent) = std::path::Path::new(&config.storage_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let db = Arc::new(StateDb::open(&config.storage_path).context("opening relationship store")?);
    let relationships = Arc::new(RelationshipStore::new(Arc::clone(&db)));

    // ── Audit log (resumable hash chain) ───────────────────────────────────
    if let Some(parent) = std::path::Path::new(&config.audit.path).parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let audit = Arc::new(neuron_audit::AuditLog::open(&config.audit.path).context("opening audit log")?);

    // ── Challenge store + admission gate ────────────────────────────────────
    let challenges = Arc::new(ChallengeStore::new(CHALLENGE_STORE_CAPACITY));
    let admission = Arc::new(AdmissionGate::new(
        config.websocket.max_concurrent_handshakes,
        Duration::from_millis(config.websocket.queue_timeout_ms),
    ));

    // ── Handshake engine ──────────────────────────────────────────────────────
    let engine = Arc::new(HandshakeEngine::new(
        Arc::clone(&challenges),
        Arc::clone(&relationships),
        Arc::clone(&audit),
        EngineConfig {
            organization_npi: config.organization.npi.clone(),
            provider_endpoint_base: format!("{}/ws/provider", config.axon.endpoint_url),
            auth_timeout: Duration::from_millis(config.websocket.auth_timeout_ms),
            max_payload_bytes: config.websocket.max_payload_bytes,
        },
    ));

    // ── Axon registration + heartbeat ────────────────────────────────────────
    let axon_client = Arc::new(AxonClient::new(config.axon.registry_url.clone()));
    let heartbeat = Arc::new(AxonHeartbeat::new(
        Arc::clone(&axon_client),
        Arc::clone(&db),
        Arc::clone(&audit),
        RegistrarConfig {
            organization_npi: config.organization.npi.clone(),
            organization_name: config.organization.name.clone(),
            organization_type: config.organization.org_type.clone(),
            registry_url: config.axon.registry_url.clone(),
            neuron_endpoint_url: config.axon.endpoint_url.clone(),
            provider_npis: config.axon.provider_npis.clone(),
        },
        HeartbeatConfig {
            interval: Duration::from_millis(config.heartbeat_interval_ms),
            backoff_ceiling: Duration::from_millis(config.axon.backoff_ceiling_ms),
        },
    ));
    let heartbeat_task = {
        let heartbeat = Arc::clone(&heartbeat);
        tokio::spawn(async move {
            if let Err(e) = heartbeat.run().await {
                tracing::error!(error = %e, "Axon registration/heartbeat loop exited with an error");
            }
        })
    };

    // ── Protocol server ───────────────────────────────────────────────────────
    let server = ProtocolServer::new(Arc::clone(&admission), Arc::clone(&engine), config.websocket.path.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing server.host/server.port into a socket address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding handshake listener on {addr}"))?;
    info!(%addr, path = %config.websocket.path, "handshake WebSocket server listening");

    let serve_server = server.clone();
    let serve_task = tokio::spawn(async move { axum::serve(listener, serve_server.router()).await });

    tokio::signal::ctrl_c().await.context("awaiting shutdown signal")?;
    info!("shutdown signal received — draining");

    server.stop().await;
    heartbeat.stop();
    let _ = heartbeat_task.await;
    serve_task.abort();

    info!("neuron-node stopped cleanly");
    Ok(())
}
