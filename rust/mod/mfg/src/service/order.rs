use serde::Serialize;
use tracing::{debug, info};

use openerp_core::{new_id, now_rfc3339, ListParams, ListResult, ServiceError};
use openerp_sql::Value;

use crate::model::{resource, AssemblyOrder, Changed, OrderStatus};
use super::lock::order_key;
use super::testing::TestingSummary;
use super::{check_version, MfgService, WriteSet};

/// Largest batch one assembly order may carry. Completion seeds this many
/// machines in one transaction under the order lock.
pub const MAX_ORDER_QUANTITY: u32 = 10_000;

pub struct CreateOrderInput {
    pub production_order_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub created_by: Option<String>,
}

/// Combined mutation from `PUT /assembly-orders/{id}`. Progress is applied
/// before the status change, and all of it commits or none of it does.
#[derive(Debug, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub progress: Option<i32>,
    pub progress_delta: Option<i32>,
    pub updated_by: String,
    pub version: Option<i64>,
}

#[derive(Debug, Default)]
pub struct OrderFilters {
    pub status: Option<String>,
    pub production_order_id: Option<String>,
}

/// An assembled order that still has units to test or account for.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestingQueueEntry {
    #[serde(flatten)]
    pub order: AssemblyOrder,
    pub testing: TestingSummary,
}

impl MfgService {
    // ── Assembly order ──

    pub fn create_order(&self, input: CreateOrderInput) -> Result<AssemblyOrder, ServiceError> {
        if input.production_order_id.trim().is_empty() {
            return Err(ServiceError::Validation("productionOrderId is required".into()));
        }
        if input.product_name.trim().is_empty() {
            return Err(ServiceError::Validation("productName is required".into()));
        }
        if input.quantity == 0 {
            return Err(ServiceError::Validation("quantity must be positive".into()));
        }
        if input.quantity > MAX_ORDER_QUANTITY {
            return Err(ServiceError::Validation(format!(
                "quantity {} exceeds the limit of {MAX_ORDER_QUANTITY} units per assembly order",
                input.quantity
            )));
        }

        let now = now_rfc3339();
        let mut order = AssemblyOrder {
            id: new_id(),
            production_order_id: input.production_order_id,
            product_name: input.product_name,
            quantity: input.quantity,
            status: OrderStatus::Pending,
            progress: 0,
            started_at: None,
            paused_at: None,
            resumed_at: None,
            completed_at: None,
            quality_check: false,
            testing_passed: false,
            created_by: input.created_by,
            updated_by: None,
            created_at: now.clone(),
            updated_at: now.clone(),
            version: 0,
        };

        let mut writes = WriteSet::default();
        writes.insert(&mut order)?;
        writes.audit(
            "create",
            resource::ASSEMBLY_ORDER,
            &order.id,
            format!(
                "assembly order for {} x{} (production order {})",
                order.product_name, order.quantity, order.production_order_id
            ),
            order.created_by.as_deref(),
            &now,
        )?;
        self.commit(writes)?;

        info!(order = %order.id, quantity = order.quantity, "assembly order created");
        Ok(order)
    }

    pub fn get_order(&self, id: &str) -> Result<AssemblyOrder, ServiceError> {
        self.get(id)
    }

    pub fn list_orders(
        &self,
        params: &ListParams,
        filters: &OrderFilters,
    ) -> Result<ListResult<AssemblyOrder>, ServiceError> {
        let mut f: Vec<(&str, Value)> = Vec::new();
        if let Some(ref s) = filters.status {
            f.push(("status", Value::from(s.as_str())));
        }
        if let Some(ref p) = filters.production_order_id {
            f.push(("production_order_id", Value::from(p.as_str())));
        }
        self.page(&f, params)
    }

    pub fn start_order(&self, id: &str, by: &str) -> Result<AssemblyOrder, ServiceError> {
        self.mutate_order(id, by, None, |o, now| o.start(now))
    }

    pub fn pause_order(&self, id: &str, by: &str) -> Result<AssemblyOrder, ServiceError> {
        self.mutate_order(id, by, None, |o, now| o.pause(now))
    }

    pub fn resume_order(&self, id: &str, by: &str) -> Result<AssemblyOrder, ServiceError> {
        self.mutate_order(id, by, None, |o, now| o.resume(now))
    }

    pub fn advance_progress(
        &self,
        id: &str,
        delta: i32,
        by: &str,
    ) -> Result<AssemblyOrder, ServiceError> {
        self.mutate_order(id, by, None, |o, _| o.advance_progress(delta))
    }

    /// Finish assembly. Seeds the order's machines for testing.
    pub fn complete_order(&self, id: &str, by: &str) -> Result<AssemblyOrder, ServiceError> {
        self.mutate_order(id, by, None, |o, now| o.complete(now))
    }

    pub fn update_order(
        &self,
        id: &str,
        update: OrderUpdate,
    ) -> Result<AssemblyOrder, ServiceError> {
        if update.updated_by.trim().is_empty() {
            return Err(ServiceError::Validation("updatedBy is required".into()));
        }
        let by = update.updated_by.clone();
        self.mutate_order(id, &by, update.version, |o, now| {
            let mut changed = false;
            if let Some(p) = update.progress {
                changed |= o.set_progress(p)?;
            }
            if let Some(d) = update.progress_delta {
                changed |= o.advance_progress(d)?;
            }
            if let Some(target) = update.status {
                changed |= apply_status(o, target, now)?;
            }
            Ok(changed)
        })
    }

    /// Assembled orders whose units are not all settled yet: the work
    /// queue shown to testing operators.
    pub fn testing_queue(&self) -> Result<Vec<TestingQueueEntry>, ServiceError> {
        let orders: Vec<AssemblyOrder> = self.find(
            &[("status", Value::from(OrderStatus::Completed.as_str()))],
            "created_at DESC, id",
        )?;

        let mut queue = Vec::new();
        for order in orders {
            let (machines, testing) = self.locks.with(&order_key(&order.id), || {
                let machines = self.machines_of(&order.id)?;
                let open = self.open_rework_orders(&order.id)?;
                let summary = TestingSummary::compute(&machines, &open);
                Ok::<_, ServiceError>((machines, summary))
            })?;
            if machines.is_empty() || machines.iter().any(|m| !m.is_settled()) {
                queue.push(TestingQueueEntry { order, testing });
            }
        }
        debug!(len = queue.len(), "testing queue");
        Ok(queue)
    }

    /// Load, mutate and persist an order under its lock.
    fn mutate_order(
        &self,
        id: &str,
        by: &str,
        version: Option<i64>,
        f: impl FnOnce(&mut AssemblyOrder, &str) -> Result<Changed, ServiceError>,
    ) -> Result<AssemblyOrder, ServiceError> {
        self.locks.with(&order_key(id), || {
            let mut order: AssemblyOrder = self.get(id)?;
            check_version(&order, version)?;

            let before = (order.status, order.progress);
            let now = now_rfc3339();
            if !f(&mut order, &now)? {
                debug!(order = %id, status = %order.status, "order transition was a no-op");
                return Ok(order);
            }
            order.updated_by = Some(by.to_string());

            let mut writes = WriteSet::default();
            if before.0 != OrderStatus::Completed && order.status == OrderStatus::Completed {
                self.seed_machines(&order, &now, &mut writes)?;
            }
            writes.update(&mut order, &now)?;
            writes.audit(
                "update",
                resource::ASSEMBLY_ORDER,
                &order.id,
                format!(
                    "status {} -> {}, progress {}% -> {}%",
                    before.0, order.status, before.1, order.progress
                ),
                Some(by),
                &now,
            )?;
            self.commit(writes)?;

            info!(
                order = %order.id,
                status = %order.status,
                progress = order.progress,
                by,
                "assembly order updated"
            );
            Ok(order)
        })
    }
}

/// Map a requested target status onto the guarded transitions.
fn apply_status(
    order: &mut AssemblyOrder,
    target: OrderStatus,
    now: &str,
) -> Result<Changed, ServiceError> {
    match target {
        OrderStatus::InProgress if order.status == OrderStatus::Paused => order.resume(now),
        OrderStatus::InProgress => order.start(now),
        OrderStatus::Paused => order.pause(now),
        OrderStatus::Completed => order.complete(now),
        OrderStatus::Pending if order.status == OrderStatus::Pending => Ok(false),
        other => Err(ServiceError::InvalidTransition(format!(
            "cannot move assembly order {} from {} to {}",
            order.id, order.status, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestResult;
    use crate::service::test_support::{assembled_order, mark, service};

    fn new_order(svc: &MfgService, qty: u32) -> AssemblyOrder {
        svc.create_order(CreateOrderInput {
            production_order_id: "po-7".into(),
            product_name: "Rotavator R-50".into(),
            quantity: qty,
            created_by: None,
        })
        .unwrap()
    }

    #[test]
    fn create_validates_input() {
        let svc = service();
        let err = svc
            .create_order(CreateOrderInput {
                production_order_id: "po".into(),
                product_name: "x".into(),
                quantity: 0,
                created_by: None,
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = svc
            .create_order(CreateOrderInput {
                production_order_id: "po".into(),
                product_name: "x".into(),
                quantity: 4_000_000_000,
                created_by: None,
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let order = svc
            .create_order(CreateOrderInput {
                production_order_id: "po".into(),
                product_name: "x".into(),
                quantity: MAX_ORDER_QUANTITY,
                created_by: None,
            })
            .unwrap();
        assert_eq!(order.quantity, MAX_ORDER_QUANTITY);
    }

    #[test]
    fn large_orders_list_machines_in_unit_order() {
        let svc = service();
        let order = assembled_order(&svc, "po-big", 1001);
        let machines = svc.list_machines(&order.id).unwrap();
        let numbers: Vec<_> = machines.iter().map(|m| m.machine_number.as_str()).collect();

        assert_eq!(numbers.len(), 1001);
        assert_eq!(&numbers[98..102], &["M099", "M100", "M101", "M102"]);
        assert_eq!(numbers[999], "M1000");
        assert_eq!(numbers[1000], "M1001");
        assert!(machines.windows(2).all(|w| w[0].seq + 1 == w[1].seq));
    }

    #[test]
    fn lifecycle_persists_and_seeds_machines() {
        let svc = service();
        let order = new_order(&svc, 3);
        assert_eq!(order.version, 1);

        svc.start_order(&order.id, "op").unwrap();
        svc.advance_progress(&order.id, 60, "op").unwrap();
        svc.pause_order(&order.id, "op").unwrap();
        svc.resume_order(&order.id, "op").unwrap();
        svc.advance_progress(&order.id, 60, "op").unwrap();
        let done = svc.complete_order(&order.id, "op").unwrap();

        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.completed_at.is_some());
        assert_eq!(done.updated_by.as_deref(), Some("op"));

        let stored = svc.get_order(&order.id).unwrap();
        assert_eq!(stored, done);

        let machines = svc.list_machines(&order.id).unwrap();
        let numbers: Vec<_> = machines.iter().map(|m| m.machine_number.as_str()).collect();
        assert_eq!(numbers, vec!["M001", "M002", "M003"]);
        assert!(machines.iter().all(|m| m.test_result == TestResult::Pending));
    }

    #[test]
    fn repeated_complete_does_not_reseed() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 2);
        let again = svc.complete_order(&order.id, "op").unwrap();
        assert_eq!(again.version, order.version);
        assert_eq!(svc.list_machines(&order.id).unwrap().len(), 2);
    }

    #[test]
    fn invalid_transition_has_no_side_effects() {
        let svc = service();
        let order = new_order(&svc, 1);
        let err = svc.pause_order(&order.id, "op").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        assert_eq!(svc.get_order(&order.id).unwrap(), order);
    }

    #[test]
    fn combined_update_is_atomic() {
        let svc = service();
        let order = new_order(&svc, 1);
        svc.start_order(&order.id, "op").unwrap();

        // Progress 80 is fine but completion is not: nothing may stick.
        let err = svc
            .update_order(
                &order.id,
                OrderUpdate {
                    progress: Some(80),
                    status: Some(OrderStatus::Completed),
                    updated_by: "op".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
        assert_eq!(svc.get_order(&order.id).unwrap().progress, 0);

        let done = svc
            .update_order(
                &order.id,
                OrderUpdate {
                    progress: Some(100),
                    status: Some(OrderStatus::Completed),
                    updated_by: "op".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
    }

    #[test]
    fn stale_version_is_rejected() {
        let svc = service();
        let order = new_order(&svc, 1);
        svc.start_order(&order.id, "op").unwrap();
        let err = svc
            .update_order(
                &order.id,
                OrderUpdate {
                    progress: Some(10),
                    updated_by: "op".into(),
                    version: Some(order.version),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(_)));
    }

    #[test]
    fn rework_status_cannot_be_requested() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 1);
        let err = svc
            .update_order(
                &order.id,
                OrderUpdate {
                    status: Some(OrderStatus::Rework),
                    updated_by: "op".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[test]
    fn testing_queue_drops_settled_orders() {
        let svc = service();
        let a = assembled_order(&svc, "po-a", 2);
        let b = assembled_order(&svc, "po-b", 1);

        let queue = svc.testing_queue().unwrap();
        assert_eq!(queue.len(), 2);

        mark(&svc, &a.id, &[TestResult::Pass, TestResult::Pass]);
        svc.process_failures(&a.id, "qa").unwrap();

        let queue = svc.testing_queue().unwrap();
        let ids: Vec<_> = queue.iter().map(|e| e.order.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str()]);
        assert_eq!(queue[0].testing.pending, 1);
    }
}
