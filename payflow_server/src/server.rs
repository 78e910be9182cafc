use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use payflow_engine::{
    broker::MemoryBroker,
    events::ORDER_EVENTS_TOPIC,
    EventWorker, OrderFlowApi, OutboxRelay, SqliteDatabase, PAYMENT_CONSUMER_GROUP,
};
use tokio::task::JoinHandle;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    payments::AutoPaymentService,
    routes::{create_order, health, order_status},
};

/// Handles of the background pipeline tasks. They run indefinitely; aborting them is the
/// shutdown path and cancels any in-flight poll or back-off sleep.
pub struct PipelineHandles {
    pub relay: JoinHandle<()>,
    pub workers: Vec<JoinHandle<()>>,
    pub metrics: JoinHandle<()>,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let broker = MemoryBroker::new(config.broker_partitions);
    let _handles = spawn_pipeline(&config, db.clone(), broker);
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Starts the outbox relay, one worker task per broker partition, and the metrics timer.
pub fn spawn_pipeline(config: &ServerConfig, db: SqliteDatabase, broker: MemoryBroker) -> PipelineHandles {
    let relay = OutboxRelay::new(db.clone(), broker.clone(), config.relay_config());
    let relay_handle = tokio::spawn(relay.run());

    let payments = AutoPaymentService::new(config.payment_failure_rate, config.payment_always_transient);
    let worker = EventWorker::new(db, payments, config.worker_config());
    let worker_handles = broker
        .subscribe(ORDER_EVENTS_TOPIC, PAYMENT_CONSUMER_GROUP)
        .into_iter()
        .map(|consumer| tokio::spawn(worker.clone().run_partition(consumer)))
        .collect();
    let metrics_handle = worker.spawn_metrics_timer(config.metrics_interval());

    PipelineHandles { relay: relay_handle, workers: worker_handles, metrics: metrics_handle }
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("payflow_server"))
            .app_data(web::Data::new(orders_api))
            .service(health)
            .service(create_order)
            .service(order_status)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
