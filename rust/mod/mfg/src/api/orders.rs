use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use openerp_core::{ListParams, ListResult, ServiceError, ValidJson, ValidQuery};

use crate::model::{AssemblyOrder, OrderStatus};
use crate::service::order::{CreateOrderInput, OrderFilters, OrderUpdate, TestingQueueEntry};
use crate::service::MfgService;

type Svc = Arc<MfgService>;

pub fn router(svc: Svc) -> Router {
    Router::new()
        .route("/assembly-orders", get(list_orders).post(create_order))
        .route("/assembly-orders/{id}", get(get_order).put(update_order))
        .route("/assembly/completed", get(testing_queue))
        .with_state(svc)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    production_order_id: String,
    product_name: String,
    quantity: u32,
    #[serde(default)]
    created_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderQuery {
    status: Option<String>,
    production_order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateOrderRequest {
    #[serde(default)]
    status: Option<OrderStatus>,
    #[serde(default)]
    progress: Option<i32>,
    /// Relative progress step, applied after `progress`.
    #[serde(default)]
    progress_delta: Option<i32>,
    updated_by: String,
    #[serde(default)]
    version: Option<i64>,
}

// ---------------------------------------------------------------------------
// POST /assembly-orders
// ---------------------------------------------------------------------------

async fn create_order(
    State(svc): State<Svc>,
    ValidJson(req): ValidJson<CreateOrderRequest>,
) -> Result<Json<AssemblyOrder>, ServiceError> {
    let order = svc.create_order(CreateOrderInput {
        production_order_id: req.production_order_id,
        product_name: req.product_name,
        quantity: req.quantity,
        created_by: req.created_by,
    })?;
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// GET /assembly-orders
// ---------------------------------------------------------------------------

async fn list_orders(
    State(svc): State<Svc>,
    ValidQuery(params): ValidQuery<ListParams>,
    ValidQuery(query): ValidQuery<OrderQuery>,
) -> Result<Json<ListResult<AssemblyOrder>>, ServiceError> {
    let filters = OrderFilters {
        status: query.status,
        production_order_id: query.production_order_id,
    };
    Ok(Json(svc.list_orders(&params, &filters)?))
}

// ---------------------------------------------------------------------------
// GET /assembly-orders/{id}
// ---------------------------------------------------------------------------

async fn get_order(
    State(svc): State<Svc>,
    Path(id): Path<String>,
) -> Result<Json<AssemblyOrder>, ServiceError> {
    Ok(Json(svc.get_order(&id)?))
}

// ---------------------------------------------------------------------------
// PUT /assembly-orders/{id}
// ---------------------------------------------------------------------------

async fn update_order(
    State(svc): State<Svc>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateOrderRequest>,
) -> Result<Json<AssemblyOrder>, ServiceError> {
    let order = svc.update_order(
        &id,
        OrderUpdate {
            status: req.status,
            progress: req.progress,
            progress_delta: req.progress_delta,
            updated_by: req.updated_by,
            version: req.version,
        },
    )?;
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// GET /assembly/completed
// ---------------------------------------------------------------------------

async fn testing_queue(
    State(svc): State<Svc>,
) -> Result<Json<Vec<TestingQueueEntry>>, ServiceError> {
    Ok(Json(svc.testing_queue()?))
}
