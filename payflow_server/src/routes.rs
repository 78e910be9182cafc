//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go
//! into a separate module. Keep this module neat and tidy 🙏
use actix_web::{get, post, web, HttpResponse, Responder};
use log::*;
use payflow_engine::{
    db_types::{NewOrder, OrderId},
    OrderFlowApi, SqliteDatabase,
};
use pf_common::Money;
use uuid::Uuid;

use crate::{
    data_objects::{NewOrderRequest, OrderCreatedResponse, OrderSummary},
    errors::ServerError,
};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// Accepts a new order. Every call creates a distinct order, even for identical bodies; there is
/// no request-id dedup.
#[post("/orders")]
pub async fn create_order(
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    Uuid::parse_str(&request.user_id)
        .map_err(|e| ServerError::InvalidRequestBody(format!("userId is not a valid UUID: {e}")))?;
    let amount =
        Money::try_from(request.amount).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    if !amount.is_positive() {
        return Err(ServerError::InvalidRequestBody("amount must be positive".to_string()));
    }
    let order = api.submit_order(NewOrder::new(request.user_id, amount)).await.map_err(|e| {
        error!("🧾️ Could not create order: {e}");
        ServerError::OrderCreationFailed
    })?;
    Ok(HttpResponse::Created().json(OrderCreatedResponse { order_id: order.id, state: order.state }))
}

#[get("/orders/{id}")]
pub async fn order_status(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let id = OrderId::from(path.into_inner());
    let order = api.order_status(&id).await.map_err(|e| {
        error!("🧾️ Could not fetch order {id}: {e}");
        ServerError::Unspecified(e.to_string())
    })?;
    match order {
        Some(order) => Ok(HttpResponse::Ok().json(OrderSummary::from(order))),
        None => Err(ServerError::OrderNotFound),
    }
}
