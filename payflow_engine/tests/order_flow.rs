//! Tests of the ingress write protocol and the conditional-update guards.
use payflow_engine::{
    db_types::{NewDeadLetter, NewOrder, OrderState},
    events::OrderCreatedPayload,
    sqlite::db::{dead_letters, orders, outbox, processed_events},
    test_utils::prepare_env::prepare_test_db,
    traits::PipelineDatabase,
    OrderFlowApi, PAYMENT_WORKER_KIND,
};
use pf_common::Money;
use uuid::Uuid;

fn new_order(cents: i64) -> NewOrder {
    NewOrder::new(Uuid::new_v4().to_string(), Money::from_cents(cents))
}

#[tokio::test]
async fn submit_order_writes_order_and_event_atomically() {
    let db = prepare_test_db().await;
    let api = OrderFlowApi::new(db.clone());

    let order = api.submit_order(new_order(9999)).await.unwrap();
    assert_eq!(order.state, OrderState::Created);
    assert_eq!(order.version, 0);
    assert_eq!(order.amount, Money::from_cents(9999));

    let mut conn = db.pool().acquire().await.unwrap();
    let events = outbox::fetch_for_aggregate(order.id.as_str(), &mut conn).await.unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, "OrderCreated");
    assert_eq!(event.aggregate_type, "order");
    assert!(!event.published);
    assert!(event.published_at.is_none());

    let payload: OrderCreatedPayload = serde_json::from_str(&event.payload).unwrap();
    assert_eq!(payload.order_id, order.id);
    assert_eq!(payload.user_id, order.user_id);
    assert_eq!(payload.amount, order.amount);
}

#[tokio::test]
async fn identical_submissions_create_distinct_orders_and_events() {
    let db = prepare_test_db().await;
    let api = OrderFlowApi::new(db.clone());
    let user = Uuid::new_v4().to_string();

    let first = api.submit_order(NewOrder::new(user.clone(), Money::from_cents(500))).await.unwrap();
    let second = api.submit_order(NewOrder::new(user, Money::from_cents(500))).await.unwrap();
    assert_ne!(first.id, second.id);

    let pending = db.fetch_unpublished_events(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_ne!(pending[0].event_id, pending[1].event_id);
}

#[tokio::test]
async fn optimistic_guard_rejects_stale_versions() {
    let db = prepare_test_db().await;
    let api = OrderFlowApi::new(db.clone());
    let order = api.submit_order(new_order(1000)).await.unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    let v1 = orders::advance_to_payment_pending(&order.id, &mut conn).await.unwrap().unwrap();
    assert_eq!(v1, 1);

    // a stale version matches 0 rows and changes nothing
    let stale = orders::settle_order(&order.id, v1 + 99, OrderState::Paid, &mut conn).await.unwrap();
    assert!(stale.is_none());
    let unchanged = orders::fetch_order(&order.id, &mut conn).await.unwrap().unwrap();
    assert_eq!(unchanged.state, OrderState::PaymentPending);
    assert_eq!(unchanged.version, 1);

    // the observed version succeeds and bumps the version by exactly one
    let settled = orders::settle_order(&order.id, v1, OrderState::Paid, &mut conn).await.unwrap().unwrap();
    assert_eq!(settled.state, OrderState::Paid);
    assert_eq!(settled.version, 2);
}

#[tokio::test]
async fn advance_only_moves_created_orders() {
    let db = prepare_test_db().await;
    let api = OrderFlowApi::new(db.clone());
    let order = api.submit_order(new_order(1000)).await.unwrap();

    let mut conn = db.pool().acquire().await.unwrap();
    assert!(orders::advance_to_payment_pending(&order.id, &mut conn).await.unwrap().is_some());
    // a second claim loses cleanly
    assert!(orders::advance_to_payment_pending(&order.id, &mut conn).await.unwrap().is_none());
    // an unknown order loses cleanly too
    let ghost = payflow_engine::db_types::OrderId::random();
    assert!(orders::advance_to_payment_pending(&ghost, &mut conn).await.unwrap().is_none());
}

#[tokio::test]
async fn settle_requires_the_pending_state() {
    let db = prepare_test_db().await;
    let api = OrderFlowApi::new(db.clone());
    let order = api.submit_order(new_order(1000)).await.unwrap();

    // Created orders cannot jump straight to a terminal state
    let mut conn = db.pool().acquire().await.unwrap();
    let settled = orders::settle_order(&order.id, 0, OrderState::Paid, &mut conn).await.unwrap();
    assert!(settled.is_none());
}

#[tokio::test]
async fn dedup_ledger_insert_is_idempotent() {
    let db = prepare_test_db().await;
    let event_id = payflow_engine::db_types::EventId::random();

    let mut conn = db.pool().acquire().await.unwrap();
    processed_events::insert_processed(&event_id, PAYMENT_WORKER_KIND, &mut conn).await.unwrap();
    processed_events::insert_processed(&event_id, PAYMENT_WORKER_KIND, &mut conn).await.unwrap();
    let entry =
        processed_events::fetch_processed(&event_id, PAYMENT_WORKER_KIND, &mut conn).await.unwrap().unwrap();
    assert_eq!(entry.event_id, event_id);
    assert_eq!(entry.worker_kind, PAYMENT_WORKER_KIND);
    // an independent worker kind has its own ledger scope
    assert!(!processed_events::is_processed(&event_id, "refund-worker", &mut conn).await.unwrap());
}

#[tokio::test]
async fn dead_letter_insert_is_idempotent_on_event_id() {
    let db = prepare_test_db().await;
    let event_id = payflow_engine::db_types::EventId::random();
    let dead_letter = NewDeadLetter {
        event_id: event_id.clone(),
        event_type: "OrderCreated".to_string(),
        aggregate_id: "o-1".to_string(),
        payload: "{}".to_string(),
        reason: "first".to_string(),
    };

    let mut conn = db.pool().acquire().await.unwrap();
    dead_letters::insert_dead_letter(dead_letter.clone(), &mut conn).await.unwrap();
    dead_letters::insert_dead_letter(NewDeadLetter { reason: "second".to_string(), ..dead_letter }, &mut conn)
        .await
        .unwrap();
    let rows = dead_letters::fetch_dead_letters(10, &mut conn).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reason, "first");
}
