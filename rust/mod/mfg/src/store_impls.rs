//! Table bindings for manufacturing models.

use openerp_sql::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::*;

/// A model persisted as one row: JSON document in `data`, optimistic
/// `version`, plus a few indexed columns.
pub(crate) trait Record: Serialize + DeserializeOwned {
    const TABLE: &'static str;
    /// Human name used in error messages.
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn touch(&mut self, now: &str);
    /// Indexed columns written next to `data`.
    fn columns(&self) -> Vec<(&'static str, Value)>;
}

macro_rules! impl_versioned {
    ($ty:ident, $table:expr, $kind:expr, |$s:ident| $cols:expr) => {
        impl Record for $ty {
            const TABLE: &'static str = $table;
            const KIND: &'static str = $kind;
            fn id(&self) -> &str { &self.id }
            fn version(&self) -> i64 { self.version }
            fn set_version(&mut self, version: i64) { self.version = version; }
            fn touch(&mut self, now: &str) { self.updated_at = now.to_string(); }
            fn columns(&self) -> Vec<(&'static str, Value)> {
                let $s = self;
                $cols
            }
        }
    };
}

impl_versioned!(AssemblyOrder, "assembly_orders", "assembly order", |o| vec![
    ("production_order_id", Value::from(o.production_order_id.as_str())),
    ("status", Value::from(o.status.as_str())),
    ("created_at", Value::from(o.created_at.as_str())),
]);

impl_versioned!(Machine, "machines", "machine", |m| vec![
    ("assembly_order_id", Value::from(m.assembly_order_id.as_str())),
    ("machine_number", Value::from(m.machine_number.as_str())),
    ("seq", Value::from(i64::from(m.seq))),
    ("created_at", Value::from(m.created_at.as_str())),
]);

impl_versioned!(ReworkOrder, "rework_orders", "rework order", |r| vec![
    ("assembly_order_id", Value::from(r.original_assembly_order_id.as_str())),
    ("status", Value::from(r.status.as_str())),
    ("created_at", Value::from(r.created_at.as_str())),
]);

impl_versioned!(ShowroomBatch, "showroom_batches", "showroom batch", |b| vec![
    ("production_order_id", Value::from(b.production_order_id.as_str())),
    ("status", Value::from(b.showroom_status.as_str())),
    ("created_at", Value::from(b.created_at.as_str())),
]);

/// Audit entries are append-only and never updated.
impl Record for AuditEntry {
    const TABLE: &'static str = "audit_log";
    const KIND: &'static str = "audit entry";
    fn id(&self) -> &str { &self.id }
    fn version(&self) -> i64 { 1 }
    fn set_version(&mut self, _version: i64) {}
    fn touch(&mut self, _now: &str) {}
    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("resource_type", Value::from(self.resource_type.as_str())),
            ("resource_id", Value::from(self.resource_id.as_str())),
            ("created_at", Value::from(self.created_at.as_str())),
        ]
    }
}
