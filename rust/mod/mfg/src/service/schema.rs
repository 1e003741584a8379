use openerp_core::ServiceError;
use openerp_sql::SQLStore;

/// SQL DDL statements to initialize the manufacturing schema.
///
/// Each table stores the full JSON document in a `data` TEXT column,
/// with indexed columns extracted for filtering and uniqueness.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS assembly_orders (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        version INTEGER NOT NULL,
        production_order_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_ao_status ON assembly_orders(status)",
    "CREATE INDEX IF NOT EXISTS idx_ao_production ON assembly_orders(production_order_id)",
    "CREATE TABLE IF NOT EXISTS machines (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        version INTEGER NOT NULL,
        assembly_order_id TEXT NOT NULL,
        machine_number TEXT NOT NULL,
        seq INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(assembly_order_id, machine_number)
    )",
    "CREATE INDEX IF NOT EXISTS idx_machine_seq ON machines(assembly_order_id, seq)",
    "CREATE TABLE IF NOT EXISTS rework_orders (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        version INTEGER NOT NULL,
        assembly_order_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    // At most one open rework order per assembly order.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_rework_open
        ON rework_orders(assembly_order_id) WHERE status != 'completed'",
    "CREATE TABLE IF NOT EXISTS showroom_batches (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        version INTEGER NOT NULL,
        production_order_id TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY,
        data TEXT NOT NULL,
        version INTEGER NOT NULL,
        resource_type TEXT NOT NULL,
        resource_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_audit_resource ON audit_log(resource_type, resource_id)",
];

/// Create all tables and indexes if they don't exist.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), ServiceError> {
    for ddl in SCHEMA {
        sql.exec(ddl, &[])
            .map_err(|e| ServiceError::Storage(format!("mfg schema init: {e}")))?;
    }
    Ok(())
}
