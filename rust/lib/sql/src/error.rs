use thiserror::Error;

#[derive(Error, Debug)]
pub enum SQLError {
    #[error("query error: {0}")]
    Query(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// A guarded statement inside [`crate::SQLStore::transact`] matched no
    /// rows. The whole batch was rolled back.
    #[error("conflict: {0}")]
    Conflict(String),
}
