use coordination::{
    BackendKind, CoordinationConfig, CoordinationStore, IdempotencyGuard, LockManager,
    MemoryStore, RedisStore,
};
use escrow_engine::{EscrowEngine, EscrowEngineConfig, EscrowScheduler};
use orchestrator::{gateway_from_config, OrchestratorConfig, PaymentOrchestrator};
use payment_core::{Config, Metrics, PaymentStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Escrow release worker starting...");

    let store_config = Config::from_env()?;
    let store = Arc::new(PaymentStore::open(&store_config)?);

    let coordination_config = CoordinationConfig::from_env()?;
    let coordination_store: Arc<dyn CoordinationStore> = match coordination_config.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Redis => {
            Arc::new(RedisStore::connect(&coordination_config.redis.url).await?)
        }
    };
    let locks = LockManager::new(
        coordination_store.clone(),
        Duration::from_secs(coordination_config.lock.ttl_secs),
    );
    let guard = IdempotencyGuard::new(
        coordination_store,
        Duration::from_secs(coordination_config.idempotency.pending_ttl_secs),
        Duration::from_secs(coordination_config.idempotency.done_ttl_secs),
    );

    let orchestrator_config = OrchestratorConfig::from_env()?;
    let gateway = gateway_from_config(&orchestrator_config.gateway)?;
    let metrics = Arc::new(Metrics::new()?);
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        store.clone(),
        locks,
        guard,
        gateway,
        metrics,
        orchestrator_config,
    ));

    let engine_config = EscrowEngineConfig::from_env()?;
    info!(
        pass_interval_secs = engine_config.pass_interval_secs,
        "escrow release worker initialized"
    );

    let engine = EscrowEngine::new(orchestrator, store);
    let handle = EscrowScheduler::new(
        engine,
        Duration::from_secs(engine_config.pass_interval_secs),
    )
    .start();

    tokio::signal::ctrl_c().await?;
    info!("Escrow release worker shutting down");
    handle.abort();

    Ok(())
}
