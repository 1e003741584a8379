use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use openerp_core::{ServiceError, ValidJson};

use crate::model::{Machine, TestResult};
use crate::service::machine::MachineUpdate;
use crate::service::rework::ProcessOutcome;
use crate::service::testing::TestingSummary;
use crate::service::MfgService;

type Svc = Arc<MfgService>;

pub fn router(svc: Svc) -> Router {
    Router::new()
        .route("/showroom/testing/machines/{order_id}", get(list_machines))
        .route("/showroom/testing/machine/{id}", put(update_machine))
        .route("/showroom/testing/summary/{order_id}", get(summary))
        .route("/showroom/testing/process/{order_id}", post(process))
        .with_state(svc)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMachineRequest {
    #[serde(default)]
    test_result: Option<TestResult>,
    #[serde(default)]
    engine_number: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    tested_by: String,
    #[serde(default)]
    version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    processed_by: String,
}

async fn list_machines(
    State(svc): State<Svc>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<Machine>>, ServiceError> {
    Ok(Json(svc.list_machines(&order_id)?))
}

async fn update_machine(
    State(svc): State<Svc>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateMachineRequest>,
) -> Result<Json<Machine>, ServiceError> {
    let machine = svc.update_machine(
        &id,
        MachineUpdate {
            test_result: req.test_result,
            engine_number: req.engine_number,
            notes: req.notes,
            tested_by: req.tested_by,
            version: req.version,
        },
    )?;
    Ok(Json(machine))
}

async fn summary(
    State(svc): State<Svc>,
    Path(order_id): Path<String>,
) -> Result<Json<TestingSummary>, ServiceError> {
    Ok(Json(svc.summarize(&order_id)?))
}

async fn process(
    State(svc): State<Svc>,
    Path(order_id): Path<String>,
    ValidJson(req): ValidJson<ProcessRequest>,
) -> Result<Json<ProcessOutcome>, ServiceError> {
    Ok(Json(svc.process_failures(&order_id, &req.processed_by)?))
}
