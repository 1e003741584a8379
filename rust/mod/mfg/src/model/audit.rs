use serde::{Deserialize, Serialize};

/// One entry of the workflow audit trail.
///
/// Written in the same transaction as the change it describes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    /// Verb, e.g. `"update"`, `"promote"`, `"complete"`.
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub created_at: String,
}

pub mod resource {
    pub const ASSEMBLY_ORDER: &str = "AssemblyOrder";
    pub const MACHINE: &str = "Machine";
    pub const REWORK_ORDER: &str = "ReworkOrder";
    pub const SHOWROOM_BATCH: &str = "ShowroomBatch";
}
