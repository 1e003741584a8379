use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use openerp_core::{ListParams, ListResult, ServiceError, ValidQuery};

use crate::model::AuditEntry;
use crate::service::audit::AuditFilter;
use crate::service::MfgService;

type Svc = Arc<MfgService>;

pub fn router(svc: Svc) -> Router {
    Router::new()
        .route("/audit", get(list_audit))
        .with_state(svc)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditQuery {
    resource_type: Option<String>,
    resource_id: Option<String>,
}

async fn list_audit(
    State(svc): State<Svc>,
    ValidQuery(params): ValidQuery<ListParams>,
    ValidQuery(query): ValidQuery<AuditQuery>,
) -> Result<Json<ListResult<AuditEntry>>, ServiceError> {
    let filter = AuditFilter {
        resource_type: query.resource_type,
        resource_id: query.resource_id,
    };
    Ok(Json(svc.list_audit(&filter, &params)?))
}
