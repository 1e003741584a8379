pub mod api;
pub mod model;
pub mod service;
mod store_impls;

use std::sync::Arc;

use axum::Router;
use openerp_core::Module;
use openerp_sql::SQLStore;

use service::MfgService;

/// The manufacturing module: assembly orders, the post-assembly quality
/// gate, rework orders and showroom promotion.
pub struct MfgModule {
    service: Arc<MfgService>,
}

impl MfgModule {
    /// Create the module and initialise its storage.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, openerp_core::ServiceError> {
        Ok(Self {
            service: Arc::new(MfgService::new(db)?),
        })
    }

    /// The service behind the routes, for programmatic use.
    pub fn service(&self) -> &Arc<MfgService> {
        &self.service
    }
}

impl Module for MfgModule {
    fn name(&self) -> &str {
        "mfg"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
