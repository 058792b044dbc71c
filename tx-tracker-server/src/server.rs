use crate::settings::{RepositoryBackend, Settings, StoreBackend};
use blockscout_service_launcher::{database, tracing::init_logs};
use migration::Migrator;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tx_tracker_logic::{
    AdapterRegistry, AdapterSettings, ProviderPools, TransactionResolver,
    chains::rpc::RpcClient,
    consumer::{Consumer, PostgresQueue, SourceEventHandler, TargetEventHandler},
    processor::{SourceTxProcessor, TargetTxProcessor},
    repository::{DocumentRepository, FanOutRepository, RelationalRepository, Repository},
};

const SERVICE_NAME: &str = "tx_tracker";

pub async fn run(settings: Settings) -> Result<(), anyhow::Error> {
    init_logs(SERVICE_NAME, &settings.tracing, &settings.jaeger)?;

    let db = database::initialize_postgres::<Migrator>(&settings.database).await?;
    let db = Arc::new(db);

    let repository = build_repository(&settings, db.clone());

    let pools = Arc::new(ProviderPools::from_settings(settings.chain_settings()?)?);
    let registry = AdapterRegistry::new(
        RpcClient::default(),
        AdapterSettings {
            gateway: settings.gateway.clone(),
            aptos: settings.aptos.clone(),
        },
        pools.clone(),
    );
    let resolver = TransactionResolver::new(
        pools.clone(),
        Arc::new(registry),
        settings.processor.call_timeout,
    );
    tracing::info!(
        network = %settings.p2p_network,
        chains = pools.chains().count(),
        "provider pools initialized"
    );

    let source_processor = SourceTxProcessor::new(
        repository.clone(),
        resolver,
        settings.processor.clone(),
        settings.p2p_network,
    );
    let target_processor = TargetTxProcessor::new(repository);

    let source_consumer = Consumer::new(
        settings.source_consumer.queue.clone(),
        Arc::new(PostgresQueue::new(db.clone(), &settings.source_consumer)),
        SourceEventHandler::new(source_processor),
        settings.source_consumer.workers,
    );
    let target_consumer = Consumer::new(
        settings.target_consumer.queue.clone(),
        Arc::new(PostgresQueue::new(db, &settings.target_consumer)),
        TargetEventHandler::new(target_processor),
        settings.target_consumer.workers,
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(err) => tracing::error!(err = ?err, "failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    futures::join!(
        source_consumer.run(cancel.clone()),
        target_consumer.run(cancel.clone()),
    );
    tracing::info!("tx tracker stopped");
    Ok(())
}

fn build_repository(settings: &Settings, db: Arc<DatabaseConnection>) -> Arc<dyn Repository> {
    let store = |backend: StoreBackend| -> Arc<dyn Repository> {
        match backend {
            StoreBackend::Relational => Arc::new(RelationalRepository::new(db.clone())),
            StoreBackend::Document => Arc::new(DocumentRepository::new(db.clone())),
        }
    };
    match settings.repository.backend {
        RepositoryBackend::Relational => store(StoreBackend::Relational),
        RepositoryBackend::Document => store(StoreBackend::Document),
        RepositoryBackend::FanOut => {
            let primary = settings.repository.fan_out_primary;
            let secondary = match primary {
                StoreBackend::Relational => StoreBackend::Document,
                StoreBackend::Document => StoreBackend::Relational,
            };
            Arc::new(FanOutRepository::new(store(primary), store(secondary)))
        }
    }
}
