pub mod schema;
pub mod audit;
pub mod order;
pub mod machine;
pub mod testing;
pub mod rework;
pub mod showroom;
mod lock;

use std::sync::Arc;

use tracing::warn;

use openerp_core::{ListParams, ListResult, ServiceError};
use openerp_sql::{Row, SQLError, SQLStore, Statement, Value};

use crate::store_impls::Record;
use lock::LockTable;

/// Manufacturing service: quality gate, rework and showroom promotion.
///
/// Every mutation runs under the lock of the assembly order it touches
/// (plus the production order lock when merging into showroom inventory)
/// and commits all of its rows in one SQL transaction.
pub struct MfgService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) locks: LockTable,
}

impl MfgService {
    pub fn new(sql: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Self {
            sql,
            locks: LockTable::default(),
        })
    }

    // ── Generic record helpers ──

    /// Get a record by id.
    pub(crate) fn get<T: Record>(&self, id: &str) -> Result<T, ServiceError> {
        let sql = format!("SELECT data FROM {} WHERE id = ?1", T::TABLE);
        let rows = self
            .sql
            .query(&sql, &[Value::from(id)])
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("{} {} not found", T::KIND, id)))?;
        decode(row)
    }

    /// All records matching `filters` (column equality), in `order_by` order.
    pub(crate) fn find<T: Record>(
        &self,
        filters: &[(&str, Value)],
        order_by: &str,
    ) -> Result<Vec<T>, ServiceError> {
        let (where_sql, params) = where_clause(filters);
        let sql = format!(
            "SELECT data FROM {}{} ORDER BY {}",
            T::TABLE,
            where_sql,
            order_by
        );
        let rows = self
            .sql
            .query(&sql, &params)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        rows.iter().map(decode).collect()
    }

    /// A page of records matching `filters`, newest first, with total count.
    pub(crate) fn page<T: Record>(
        &self,
        filters: &[(&str, Value)],
        params: &ListParams,
    ) -> Result<ListResult<T>, ServiceError> {
        let (where_sql, mut values) = where_clause(filters);

        let count_sql = format!("SELECT COUNT(*) as cnt FROM {}{}", T::TABLE, where_sql);
        let total = self
            .sql
            .query(&count_sql, &values)
            .map_err(|e| ServiceError::Storage(e.to_string()))?
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        let limit_idx = values.len() + 1;
        let offset_idx = values.len() + 2;
        values.push(Value::Integer(params.effective_limit() as i64));
        values.push(Value::Integer(params.offset as i64));

        let sql = format!(
            "SELECT data FROM {}{} ORDER BY created_at DESC, id LIMIT ?{} OFFSET ?{}",
            T::TABLE,
            where_sql,
            limit_idx,
            offset_idx,
        );
        let rows = self
            .sql
            .query(&sql, &values)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let items = rows.iter().map(decode).collect::<Result<Vec<T>, _>>()?;

        Ok(ListResult { items, total })
    }

    /// Commit a write set atomically.
    pub(crate) fn commit(&self, writes: WriteSet) -> Result<(), ServiceError> {
        if writes.statements.is_empty() {
            return Ok(());
        }
        self.sql.transact(&writes.statements).map_err(|e| match e {
            SQLError::Conflict(stmt) => {
                warn!("optimistic version check failed: {stmt}");
                ServiceError::ConcurrentModification(
                    "record was modified concurrently, re-fetch and retry".into(),
                )
            }
            SQLError::Execution(msg) if msg.contains("UNIQUE constraint") => {
                warn!("uniqueness race lost: {msg}");
                ServiceError::ConcurrentModification(
                    "record was created concurrently, re-fetch and retry".into(),
                )
            }
            other => ServiceError::Storage(other.to_string()),
        })?;
        Ok(())
    }
}

fn where_clause(filters: &[(&str, Value)]) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    for (i, (col, val)) in filters.iter().enumerate() {
        clauses.push(format!("{} = ?{}", col, i + 1));
        params.push(val.clone());
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

/// Deserialize a record from a row's `data` JSON column.
fn decode<T: Record>(row: &Row) -> Result<T, ServiceError> {
    let data = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(data)
        .map_err(|e| ServiceError::Storage(format!("bad {} json: {e}", T::KIND)))
}

// ---------------------------------------------------------------------------
// WriteSet
// ---------------------------------------------------------------------------

/// Statements collected by one operation and committed together.
#[derive(Default)]
pub(crate) struct WriteSet {
    statements: Vec<Statement>,
}

impl WriteSet {
    /// Queue an insert. The record starts at version 1.
    pub(crate) fn insert<T: Record>(&mut self, record: &mut T) -> Result<(), ServiceError> {
        record.set_version(1);
        let data = serde_json::to_string(record)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let columns = record.columns();
        let mut names = vec!["id", "data", "version"];
        let mut params = vec![Value::from(record.id()), Value::Text(data), Value::Integer(1)];
        for (col, val) in columns {
            names.push(col);
            params.push(val);
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();

        self.statements.push(Statement::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                T::TABLE,
                names.join(", "),
                placeholders.join(", "),
            ),
            params,
        ));
        Ok(())
    }

    /// Queue a version-guarded update and bump the record's version.
    pub(crate) fn update<T: Record>(
        &mut self,
        record: &mut T,
        now: &str,
    ) -> Result<(), ServiceError> {
        let expected = record.version();
        record.set_version(expected + 1);
        record.touch(now);
        let data = serde_json::to_string(record)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let mut sets = vec!["data = ?1".to_string(), "version = ?2".to_string()];
        let mut params = vec![Value::Text(data), Value::Integer(expected + 1)];
        for (col, val) in record.columns() {
            params.push(val);
            sets.push(format!("{} = ?{}", col, params.len()));
        }
        params.push(Value::from(record.id()));
        let id_idx = params.len();
        params.push(Value::Integer(expected));
        let version_idx = params.len();

        self.statements.push(Statement::guarded(
            format!(
                "UPDATE {} SET {} WHERE id = ?{} AND version = ?{}",
                T::TABLE,
                sets.join(", "),
                id_idx,
                version_idx,
            ),
            params,
        ));
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Reject a write whose caller-supplied optimistic token is stale.
pub(crate) fn check_version<T: Record>(
    record: &T,
    expected: Option<i64>,
) -> Result<(), ServiceError> {
    match expected {
        Some(v) if v != record.version() => Err(ServiceError::ConcurrentModification(format!(
            "{} {} is at version {}, request was based on version {}",
            T::KIND,
            record.id(),
            record.version(),
            v
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use openerp_sql::SqliteStore;

    use super::MfgService;
    use crate::model::{AssemblyOrder, TestResult};
    use crate::service::machine::MachineUpdate;
    use crate::service::order::{CreateOrderInput, OrderUpdate};

    pub fn service() -> MfgService {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        MfgService::new(db).unwrap()
    }

    /// An order that went through assembly and has `quantity` pending machines.
    pub fn assembled_order(svc: &MfgService, production_order_id: &str, quantity: u32) -> AssemblyOrder {
        let order = svc
            .create_order(CreateOrderInput {
                production_order_id: production_order_id.into(),
                product_name: "Power Tiller T-200".into(),
                quantity,
                created_by: Some("planner".into()),
            })
            .unwrap();
        svc.start_order(&order.id, "operator").unwrap();
        svc.update_order(
            &order.id,
            OrderUpdate {
                progress: Some(100),
                updated_by: "operator".into(),
                ..Default::default()
            },
        )
        .unwrap();
        svc.complete_order(&order.id, "operator").unwrap()
    }

    /// Mark machines of an order, in machine-number order.
    pub fn mark(svc: &MfgService, order_id: &str, results: &[TestResult]) {
        let machines = svc.list_machines(order_id).unwrap();
        assert_eq!(machines.len(), results.len());
        for (m, r) in machines.iter().zip(results) {
            svc.update_machine(
                &m.id,
                MachineUpdate {
                    test_result: Some(*r),
                    tested_by: "qa".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        }
    }
}
