use actix_web::{test, web, App};
use payflow_engine::{test_utils::prepare_env::prepare_test_db, OrderFlowApi, SqliteDatabase};
use serde_json::{json, Value};

use crate::routes::{create_order, health, order_status};

macro_rules! test_app {
    ($db:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(OrderFlowApi::new($db)))
                .service(health)
                .service(create_order)
                .service(order_status),
        )
        .await
    };
}

async fn fresh_db() -> SqliteDatabase {
    prepare_test_db().await
}

#[actix_web::test]
async fn health_check() {
    let app = test_app!(fresh_db().await);
    let req = test::TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert!(res.status().is_success());
}

#[actix_web::test]
async fn create_order_returns_201_with_created_state() {
    let app = test_app!(fresh_db().await);
    let req = test::TestRequest::post()
        .uri("/orders")
        .set_json(json!({ "userId": "7b6b0a96-9e7d-4dbb-8f4a-2f3a00f5f8f1", "amount": 99.99 }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 201);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["state"], "CREATED");
    assert!(body["orderId"].is_string());
}

#[actix_web::test]
async fn identical_bodies_create_distinct_orders() {
    let app = test_app!(fresh_db().await);
    let payload = json!({ "userId": "7b6b0a96-9e7d-4dbb-8f4a-2f3a00f5f8f1", "amount": 10.00 });
    let first: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/orders").set_json(payload.clone()).to_request(),
    )
    .await;
    let second: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post().uri("/orders").set_json(payload).to_request(),
    )
    .await;
    assert_ne!(first["orderId"], second["orderId"]);
}

#[actix_web::test]
async fn create_order_rejects_invalid_input() {
    let app = test_app!(fresh_db().await);
    for payload in [
        json!({ "userId": "not-a-uuid", "amount": 10.0 }),
        json!({ "userId": "7b6b0a96-9e7d-4dbb-8f4a-2f3a00f5f8f1", "amount": -5.0 }),
        json!({ "userId": "7b6b0a96-9e7d-4dbb-8f4a-2f3a00f5f8f1", "amount": 0.0 }),
        json!({ "userId": "7b6b0a96-9e7d-4dbb-8f4a-2f3a00f5f8f1", "amount": 1.999 }),
    ] {
        let req = test::TestRequest::post().uri("/orders").set_json(payload.clone()).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 400, "expected 400 for {payload}");
    }
}

#[actix_web::test]
async fn order_status_roundtrip() {
    let app = test_app!(fresh_db().await);
    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/orders")
            .set_json(json!({ "userId": "7b6b0a96-9e7d-4dbb-8f4a-2f3a00f5f8f1", "amount": 42.00 }))
            .to_request(),
    )
    .await;
    let order_id = created["orderId"].as_str().unwrap();

    let status: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri(&format!("/orders/{order_id}")).to_request(),
    )
    .await;
    assert_eq!(status["state"], "CREATED");
    assert_eq!(status["version"], 0);
    assert_eq!(status["amount"], 42.0);
}

#[actix_web::test]
async fn order_status_unknown_is_404() {
    let app = test_app!(fresh_db().await);
    let req = test::TestRequest::get().uri("/orders/no-such-order").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), 404);
}
