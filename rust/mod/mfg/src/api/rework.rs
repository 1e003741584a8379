use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use openerp_core::{ServiceError, ValidJson, ValidQuery};

use crate::model::{ReworkOrder, ReworkStatus};
use crate::service::rework::{ReworkCompletion, ReworkUpdate};
use crate::service::MfgService;

type Svc = Arc<MfgService>;

pub fn router(svc: Svc) -> Router {
    Router::new()
        .route("/assembly/rework-orders", get(list_rework_orders))
        .route(
            "/assembly/rework-orders/{id}",
            get(get_rework_order).put(update_rework_order),
        )
        .route("/assembly/rework-orders/{id}/complete", post(complete_rework))
        .with_state(svc)
}

#[derive(Debug, Default, Deserialize)]
struct ReworkListQuery {
    /// Include completed rework orders.
    #[serde(default)]
    all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateReworkRequest {
    #[serde(default)]
    status: Option<ReworkStatus>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    updated_by: String,
    #[serde(default)]
    version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteReworkRequest {
    completed_by: String,
    #[serde(default)]
    notes: Option<String>,
    /// Corrected engine numbers keyed by machine id.
    #[serde(default)]
    engine_numbers: HashMap<String, String>,
}

async fn list_rework_orders(
    State(svc): State<Svc>,
    ValidQuery(query): ValidQuery<ReworkListQuery>,
) -> Result<Json<Vec<ReworkOrder>>, ServiceError> {
    Ok(Json(svc.list_rework_orders(query.all)?))
}

async fn get_rework_order(
    State(svc): State<Svc>,
    Path(id): Path<String>,
) -> Result<Json<ReworkOrder>, ServiceError> {
    Ok(Json(svc.get_rework_order(&id)?))
}

async fn update_rework_order(
    State(svc): State<Svc>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateReworkRequest>,
) -> Result<Json<ReworkOrder>, ServiceError> {
    let rework = svc.update_rework_status(
        &id,
        ReworkUpdate {
            status: req.status,
            notes: req.notes,
            updated_by: req.updated_by,
            version: req.version,
        },
    )?;
    Ok(Json(rework))
}

async fn complete_rework(
    State(svc): State<Svc>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<CompleteReworkRequest>,
) -> Result<Json<ReworkCompletion>, ServiceError> {
    let done = svc.complete_rework(&id, &req.completed_by, req.notes, req.engine_numbers)?;
    Ok(Json(done))
}
