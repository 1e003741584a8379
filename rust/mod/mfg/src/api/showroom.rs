use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use openerp_core::{ServiceError, ValidJson};

use crate::model::ShowroomBatch;
use crate::service::showroom::{AvailableBatch, DisplayedBatch, PricingUpdate};
use crate::service::MfgService;

type Svc = Arc<MfgService>;

pub fn router(svc: Svc) -> Router {
    Router::new()
        .route("/sales/showroom/available", get(list_available))
        .route("/sales/showroom/{id}/sell", post(sell))
        .route("/showroom/displayed", get(list_displayed))
        .route("/showroom/batches/{id}", get(get_batch).put(update_pricing))
        .with_state(svc)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellRequest {
    quantity: u32,
    sold_by: String,
    #[serde(default)]
    version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingRequest {
    #[serde(default)]
    cost_price: Option<f64>,
    #[serde(default)]
    sale_price: Option<f64>,
    updated_by: String,
    #[serde(default)]
    version: Option<i64>,
}

async fn list_available(
    State(svc): State<Svc>,
) -> Result<Json<Vec<AvailableBatch>>, ServiceError> {
    Ok(Json(svc.list_available()?))
}

async fn list_displayed(
    State(svc): State<Svc>,
) -> Result<Json<Vec<DisplayedBatch>>, ServiceError> {
    Ok(Json(svc.list_displayed()?))
}

async fn get_batch(
    State(svc): State<Svc>,
    Path(id): Path<String>,
) -> Result<Json<ShowroomBatch>, ServiceError> {
    Ok(Json(svc.get_batch(&id)?))
}

async fn update_pricing(
    State(svc): State<Svc>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<PricingRequest>,
) -> Result<Json<ShowroomBatch>, ServiceError> {
    let update = PricingUpdate {
        cost_price: req.cost_price,
        sale_price: req.sale_price,
        updated_by: req.updated_by,
        version: req.version,
    };
    Ok(Json(svc.update_pricing(&id, update)?))
}

async fn sell(
    State(svc): State<Svc>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<SellRequest>,
) -> Result<Json<ShowroomBatch>, ServiceError> {
    Ok(Json(svc.record_sale(&id, req.quantity, &req.sold_by, req.version)?))
}
