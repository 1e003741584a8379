use openerp_core::{new_id, ListParams, ListResult, ServiceError};
use openerp_sql::Value;

use crate::model::AuditEntry;
use super::{MfgService, WriteSet};

#[derive(Debug, Default)]
pub struct AuditFilter {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

impl WriteSet {
    /// Queue an audit entry alongside the change it describes.
    pub(crate) fn audit(
        &mut self,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        description: String,
        username: Option<&str>,
        now: &str,
    ) -> Result<(), ServiceError> {
        let mut entry = AuditEntry {
            id: new_id(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            description,
            username: username.map(str::to_string),
            created_at: now.to_string(),
        };
        self.insert(&mut entry)
    }
}

impl MfgService {
    pub fn list_audit(
        &self,
        filter: &AuditFilter,
        params: &ListParams,
    ) -> Result<ListResult<AuditEntry>, ServiceError> {
        let mut f: Vec<(&str, Value)> = Vec::new();
        if let Some(ref t) = filter.resource_type {
            f.push(("resource_type", Value::from(t.as_str())));
        }
        if let Some(ref id) = filter.resource_id {
            f.push(("resource_id", Value::from(id.as_str())));
        }
        self.page(&f, params)
    }
}
