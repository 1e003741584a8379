pub mod config;
pub mod error;
pub mod extract;
pub mod module;
pub mod types;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use extract::{ValidJson, ValidQuery};
pub use module::Module;
pub use types::{ListParams, ListResult, new_id, now_rfc3339};
