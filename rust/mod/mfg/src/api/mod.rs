mod audit;
mod orders;
mod rework;
mod showroom;
mod testing;

use std::sync::Arc;

use axum::Router;

use crate::service::MfgService;

/// Build the complete manufacturing router. Paths are relative to `/api`.
///
/// Routes:
/// - `POST   /assembly-orders`                          create assembly order
/// - `GET    /assembly-orders`                          list assembly orders
/// - `GET    /assembly-orders/{id}`                     get assembly order
/// - `PUT    /assembly-orders/{id}`                     status / progress change
/// - `GET    /assembly/completed`                       orders with outstanding testing
/// - `GET    /showroom/testing/machines/{orderId}`      machines of an order
/// - `PUT    /showroom/testing/machine/{id}`            record a test result
/// - `GET    /showroom/testing/summary/{orderId}`       testing summary
/// - `POST   /showroom/testing/process/{orderId}`       hand off failures, promote passes
/// - `GET    /assembly/rework-orders`                   open rework orders (`?all=true`)
/// - `GET    /assembly/rework-orders/{id}`              get rework order
/// - `PUT    /assembly/rework-orders/{id}`              start rework / edit notes
/// - `POST   /assembly/rework-orders/{id}/complete`     release machines for re-test
/// - `GET    /sales/showroom/available`                 batches on display
/// - `POST   /sales/showroom/{id}/sell`                 record a sale
/// - `GET    /showroom/displayed`                       batches on display with unit breakdown
/// - `GET    /showroom/batches/{id}`                    get showroom batch
/// - `PUT    /showroom/batches/{id}`                    change unit prices
/// - `GET    /audit`                                    audit trail
pub fn router(svc: Arc<MfgService>) -> Router {
    Router::new()
        .merge(orders::router(Arc::clone(&svc)))
        .merge(testing::router(Arc::clone(&svc)))
        .merge(rework::router(Arc::clone(&svc)))
        .merge(showroom::router(Arc::clone(&svc)))
        .merge(audit::router(svc))
}
