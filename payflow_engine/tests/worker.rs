//! Tests of the event worker: the staged handler, idempotency, retries and the dead-letter path.
use std::time::Duration;

use payflow_engine::{
    broker::Delivery,
    db_types::{NewOrder, Order, OrderState},
    events::EventEnvelope,
    sqlite::db::outbox,
    test_utils::{mocks::ScriptedPaymentService, prepare_env::prepare_test_db},
    traits::{PaymentError, PaymentStatus, PipelineDatabase},
    EventWorker, OrderFlowApi, SqliteDatabase, WorkerConfig, PAYMENT_WORKER_KIND,
};
use pf_common::Money;
use uuid::Uuid;

fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        max_retries: 3,
        retry_backoff: Duration::from_millis(10),
        poll_timeout: Duration::from_millis(20),
    }
}

/// Submits an order and returns it together with the delivery the relay would hand the worker.
async fn submitted_order(db: &SqliteDatabase) -> (Order, Delivery) {
    let api = OrderFlowApi::new(db.clone());
    let order = api
        .submit_order(NewOrder::new(Uuid::new_v4().to_string(), Money::from_cents(9999)))
        .await
        .unwrap();
    let record = db.fetch_unpublished_events(10).await.unwrap().pop().unwrap();
    let envelope = EventEnvelope::from_outbox_record(&record).unwrap();
    let delivery = Delivery {
        key: record.aggregate_id.clone(),
        value: envelope.to_json().unwrap(),
        partition: 0,
        offset: 0,
    };
    (order, delivery)
}

async fn outbox_event_types(db: &SqliteDatabase, order: &Order) -> Vec<String> {
    let mut conn = db.pool().acquire().await.unwrap();
    outbox::fetch_for_aggregate(order.id.as_str(), &mut conn)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.event_type)
        .collect()
}

#[tokio::test]
async fn successful_payment_settles_the_order_as_paid() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;
    let payments = ScriptedPaymentService::always(PaymentStatus::Success);
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());

    worker.process_delivery(&delivery).await;

    let settled = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(settled.state, OrderState::Paid);
    assert_eq!(settled.version, 2);
    assert_eq!(payments.calls(), 1);
    assert_eq!(outbox_event_types(&db, &order).await, vec!["OrderCreated", "OrderPaid"]);

    let envelope = EventEnvelope::from_json(&delivery.value).unwrap();
    assert!(db.is_event_processed(&envelope.event_id, PAYMENT_WORKER_KIND).await.unwrap());

    let snapshot = worker.counters().snapshot();
    assert_eq!(snapshot.events_processed, 1);
    assert_eq!(snapshot.payments_success, 1);
    assert_eq!(snapshot.dlq_events, 0);
}

#[tokio::test]
async fn declined_payment_settles_the_order_as_failed() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;
    let worker =
        EventWorker::new(db.clone(), ScriptedPaymentService::always(PaymentStatus::Failed), fast_worker_config());

    worker.process_delivery(&delivery).await;

    let settled = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(settled.state, OrderState::Failed);
    assert_eq!(settled.version, 2);
    assert_eq!(outbox_event_types(&db, &order).await, vec!["OrderCreated", "OrderFailed"]);
    assert_eq!(worker.counters().snapshot().payments_failed, 1);
}

#[tokio::test]
async fn replaying_a_processed_envelope_changes_nothing() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;
    let payments = ScriptedPaymentService::always(PaymentStatus::Success);
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());

    worker.process_delivery(&delivery).await;
    let settled = db.fetch_order(&order.id).await.unwrap().unwrap();

    // manual re-enqueue of the same envelope
    worker.process_delivery(&delivery).await;

    let after = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(after.state, settled.state);
    assert_eq!(after.version, settled.version);
    assert_eq!(payments.calls(), 1, "a replay must not charge again");
    assert_eq!(outbox_event_types(&db, &order).await.len(), 2, "a replay must not append events");
    assert_eq!(worker.counters().snapshot().duplicates_skipped, 1);
}

#[tokio::test]
async fn poison_payment_is_dead_lettered_and_the_order_left_pending() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;
    let payments = ScriptedPaymentService::always_transient();
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());

    worker.process_delivery(&delivery).await;

    // the whole handler ran three times; each attempt reached the provider
    assert_eq!(payments.calls(), 3);

    let envelope = EventEnvelope::from_json(&delivery.value).unwrap();
    let dead = db.fetch_dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].event_id, envelope.event_id);
    assert!(dead[0].reason.contains("unreachable"));

    // the claim is not rolled back, preventing a later double charge
    let stuck = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stuck.state, OrderState::PaymentPending);
    assert_eq!(stuck.version, 1);
    assert!(!db.is_event_processed(&envelope.event_id, PAYMENT_WORKER_KIND).await.unwrap());

    let snapshot = worker.counters().snapshot();
    assert_eq!(snapshot.retried_events, 2);
    assert_eq!(snapshot.dlq_events, 1);
    assert_eq!(snapshot.events_processed, 0);
}

#[tokio::test]
async fn redelivered_poison_event_keeps_a_single_dead_letter_row() {
    let db = prepare_test_db().await;
    let (_, delivery) = submitted_order(&db).await;
    let worker = EventWorker::new(db.clone(), ScriptedPaymentService::always_transient(), fast_worker_config());

    worker.process_delivery(&delivery).await;
    worker.process_delivery(&delivery).await;

    let api = OrderFlowApi::new(db.clone());
    assert_eq!(api.dead_letters(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn transient_failure_recovers_without_charging_twice_per_attempt() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;
    let payments = ScriptedPaymentService::scripted(
        vec![Err(PaymentError::Transient("blip".to_string()))],
        Ok(PaymentStatus::Success),
    );
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());

    worker.process_delivery(&delivery).await;

    let settled = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(settled.state, OrderState::Paid);
    assert_eq!(settled.version, 2);
    assert_eq!(payments.calls(), 2);
    assert_eq!(worker.counters().snapshot().retried_events, 1);
    assert!(db.fetch_dead_letters(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn losing_the_claim_skips_the_payment_entirely() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;

    // a peer worker claimed the order first
    assert!(db.advance_to_payment_pending(&order.id).await.unwrap().is_some());

    let payments = ScriptedPaymentService::always(PaymentStatus::Success);
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());
    worker.process_delivery(&delivery).await;

    assert_eq!(payments.calls(), 0, "the loser of the claim must never charge");
    let pending = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(pending.state, OrderState::PaymentPending);
    assert_eq!(pending.version, 1);
    assert_eq!(outbox_event_types(&db, &order).await, vec!["OrderCreated"]);
}

#[tokio::test]
async fn events_for_unknown_orders_are_acknowledged_cleanly() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;

    // rebuild the envelope to target an order that does not exist
    let mut envelope = EventEnvelope::from_json(&delivery.value).unwrap();
    let ghost = payflow_engine::db_types::OrderId::random();
    envelope.aggregate_id = ghost.to_string();
    envelope.payload["orderId"] = serde_json::Value::String(ghost.to_string());
    let ghost_delivery = Delivery { key: envelope.aggregate_id.clone(), value: envelope.to_json().unwrap(), ..delivery };

    let payments = ScriptedPaymentService::always(PaymentStatus::Success);
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());
    worker.process_delivery(&ghost_delivery).await;

    assert_eq!(payments.calls(), 0);
    assert!(db.fetch_dead_letters(10).await.unwrap().is_empty());
    let untouched = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(untouched.state, OrderState::Created);
}

#[tokio::test]
async fn other_event_types_are_ignored() {
    let db = prepare_test_db().await;
    let (order, delivery) = submitted_order(&db).await;

    let mut envelope = EventEnvelope::from_json(&delivery.value).unwrap();
    envelope.event_type = "OrderPaid".to_string();
    envelope.payload = serde_json::json!({ "orderId": order.id });
    let paid_delivery = Delivery { value: envelope.to_json().unwrap(), ..delivery };

    let payments = ScriptedPaymentService::always(PaymentStatus::Success);
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());
    worker.process_delivery(&paid_delivery).await;

    assert_eq!(payments.calls(), 0);
    let untouched = db.fetch_order(&order.id).await.unwrap().unwrap();
    assert_eq!(untouched.state, OrderState::Created);
    assert_eq!(untouched.version, 0);
}

#[tokio::test]
async fn undecodable_payload_goes_straight_to_the_dead_letter_queue() {
    let db = prepare_test_db().await;
    let (_, delivery) = submitted_order(&db).await;

    let mut envelope = EventEnvelope::from_json(&delivery.value).unwrap();
    envelope.payload = serde_json::json!({ "orderId": 42 });
    let bad_delivery = Delivery { value: envelope.to_json().unwrap(), ..delivery };

    let payments = ScriptedPaymentService::always(PaymentStatus::Success);
    let worker = EventWorker::new(db.clone(), payments.clone(), fast_worker_config());
    worker.process_delivery(&bad_delivery).await;

    assert_eq!(payments.calls(), 0);
    let dead = db.fetch_dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].event_id, envelope.event_id);
}
