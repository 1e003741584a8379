use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, error, info};

use openerp_core::{new_id, now_rfc3339, ServiceError};
use openerp_sql::Value;

use crate::model::{
    resource, AssemblyOrder, Machine, PromotionDelta, ShowroomBatch, ShowroomState,
    ShowroomStatus, DEFAULT_MARKUP, DEFAULT_UNIT_COST,
};
use super::lock::showroom_key;
use super::{check_version, decode, MfgService, WriteSet};

/// A showroom batch as listed for sales.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableBatch {
    #[serde(flatten)]
    pub batch: ShowroomBatch,
    /// Units that can be sold right now.
    pub available_quantity: u32,
    /// Rework units released by their rework order and waiting for re-test.
    pub pending_retest_quantity: u32,
}

/// Where the units behind one showroom batch currently are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineBreakdown {
    /// Units of every assembly order feeding the batch.
    pub total: u32,
    pub displayed: u32,
    /// Units held by an open rework order.
    pub in_rework: u32,
    pub pending_retest: u32,
}

/// A showroom batch as shown on the showroom floor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedBatch {
    #[serde(flatten)]
    pub batch: ShowroomBatch,
    pub machine_breakdown: MachineBreakdown,
}

/// Price change from `PUT /showroom/batches/{id}`. Omitted prices are kept.
#[derive(Debug, Default)]
pub struct PricingUpdate {
    pub cost_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub updated_by: String,
    pub version: Option<i64>,
}

impl MfgService {
    // ── Showroom ──

    /// Merge a promotion into the production order's batch, creating the
    /// batch on first promotion. The caller holds the production order's
    /// showroom lock and commits `writes`.
    pub(crate) fn promote(
        &self,
        order: &AssemblyOrder,
        existing: Option<ShowroomBatch>,
        delta: &PromotionDelta,
        by: &str,
        now: &str,
        writes: &mut WriteSet,
    ) -> Result<ShowroomBatch, ServiceError> {
        let created = existing.is_none();
        let mut batch = existing.unwrap_or_else(|| ShowroomBatch {
            id: new_id(),
            production_order_id: order.production_order_id.clone(),
            name: order.product_name.clone(),
            original_quantity: 0,
            display_quantity: 0,
            rework_quantity: 0,
            sold_quantity: 0,
            cost_price: DEFAULT_UNIT_COST,
            sale_price: DEFAULT_UNIT_COST * DEFAULT_MARKUP,
            showroom_status: ShowroomStatus::SoldOut,
            displayed_at: now.to_string(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
            version: 0,
        });

        if let Err(e) = batch.apply(delta) {
            error!(
                batch = %batch.id,
                order = %order.id,
                ?delta,
                "showroom promotion rejected: {e}"
            );
            return Err(e);
        }
        if delta.passing() > 0 {
            batch.displayed_at = now.to_string();
        }

        if created {
            writes.insert(&mut batch)?;
        } else {
            writes.update(&mut batch, now)?;
        }
        writes.audit(
            "promote",
            resource::SHOWROOM_BATCH,
            &batch.id,
            format!(
                "from assembly order {}: {} new on display, {} back from rework, {} into rework",
                order.id, delta.new_display, delta.returned, delta.new_rework
            ),
            Some(by),
            now,
        )?;

        info!(
            batch = %batch.id,
            production_order = %batch.production_order_id,
            display = batch.display_quantity,
            rework = batch.rework_quantity,
            original = batch.original_quantity,
            "showroom batch promoted"
        );
        Ok(batch)
    }

    /// Record a sale: `quantity` units move from display to sold.
    pub fn record_sale(
        &self,
        batch_id: &str,
        quantity: u32,
        sold_by: &str,
        version: Option<i64>,
    ) -> Result<ShowroomBatch, ServiceError> {
        if sold_by.trim().is_empty() {
            return Err(ServiceError::Validation("soldBy is required".into()));
        }
        let production_order_id = self.get_batch(batch_id)?.production_order_id;

        self.locks.with(&showroom_key(&production_order_id), || {
            let mut batch: ShowroomBatch = self.get(batch_id)?;
            check_version(&batch, version)?;
            batch.sell(quantity)?;

            let now = now_rfc3339();
            let mut writes = WriteSet::default();
            writes.update(&mut batch, &now)?;
            writes.audit(
                "sell",
                resource::SHOWROOM_BATCH,
                &batch.id,
                format!("{quantity} units sold at {:.2} each", batch.sale_price),
                Some(sold_by),
                &now,
            )?;
            self.commit(writes)?;

            info!(batch = %batch.id, quantity, sold_by, "showroom sale recorded");
            Ok(batch)
        })
    }

    /// Change a batch's unit prices.
    pub fn update_pricing(
        &self,
        batch_id: &str,
        update: PricingUpdate,
    ) -> Result<ShowroomBatch, ServiceError> {
        if update.updated_by.trim().is_empty() {
            return Err(ServiceError::Validation("updatedBy is required".into()));
        }
        let production_order_id = self.get_batch(batch_id)?.production_order_id;

        self.locks.with(&showroom_key(&production_order_id), || {
            let mut batch: ShowroomBatch = self.get(batch_id)?;
            check_version(&batch, update.version)?;
            let before = (batch.cost_price, batch.sale_price);
            batch.set_pricing(update.cost_price, update.sale_price)?;
            if (batch.cost_price, batch.sale_price) == before {
                return Ok(batch);
            }

            let now = now_rfc3339();
            let mut writes = WriteSet::default();
            writes.update(&mut batch, &now)?;
            writes.audit(
                "reprice",
                resource::SHOWROOM_BATCH,
                &batch.id,
                format!(
                    "cost {:.2} -> {:.2}, sale {:.2} -> {:.2}",
                    before.0, batch.cost_price, before.1, batch.sale_price
                ),
                Some(&update.updated_by),
                &now,
            )?;
            self.commit(writes)?;

            info!(
                batch = %batch.id,
                cost = batch.cost_price,
                sale = batch.sale_price,
                "showroom batch repriced"
            );
            Ok(batch)
        })
    }

    pub fn get_batch(&self, id: &str) -> Result<ShowroomBatch, ServiceError> {
        self.get(id)
    }

    /// Batches with units on display, newest first.
    pub fn list_available(&self) -> Result<Vec<AvailableBatch>, ServiceError> {
        let (batches, mut breakdowns) = self.batches_on_display()?;
        let out: Vec<_> = batches
            .into_iter()
            .map(|batch| AvailableBatch {
                available_quantity: batch.display_quantity,
                pending_retest_quantity: breakdowns
                    .remove(&batch.production_order_id)
                    .unwrap_or_default()
                    .pending_retest,
                batch,
            })
            .collect();
        debug!(count = out.len(), "available showroom batches");
        Ok(out)
    }

    /// Batches on the showroom floor with the state of the units behind them.
    pub fn list_displayed(&self) -> Result<Vec<DisplayedBatch>, ServiceError> {
        let (batches, mut breakdowns) = self.batches_on_display()?;
        let out: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let mut machine_breakdown = breakdowns
                    .remove(&batch.production_order_id)
                    .unwrap_or_default();
                machine_breakdown.displayed = batch.display_quantity;
                DisplayedBatch { batch, machine_breakdown }
            })
            .collect();
        debug!(count = out.len(), "displayed showroom batches");
        Ok(out)
    }

    pub(crate) fn batch_for(
        &self,
        production_order_id: &str,
    ) -> Result<Option<ShowroomBatch>, ServiceError> {
        let mut found: Vec<ShowroomBatch> = self.find(
            &[("production_order_id", Value::from(production_order_id))],
            "id",
        )?;
        Ok(found.pop())
    }

    /// Available batches, newest first, plus per production order unit
    /// counts. Two queries regardless of how many batches are listed.
    fn batches_on_display(
        &self,
    ) -> Result<(Vec<ShowroomBatch>, HashMap<String, MachineBreakdown>), ServiceError> {
        let status = Value::from(ShowroomStatus::Available.as_str());
        let batches: Vec<ShowroomBatch> =
            self.find(&[("status", status.clone())], "created_at DESC, id")?;
        if batches.is_empty() {
            return Ok((batches, HashMap::new()));
        }

        let rows = self
            .sql
            .query(
                "SELECT a.production_order_id AS po, m.data AS data
                 FROM machines m
                 JOIN assembly_orders a ON a.id = m.assembly_order_id
                 JOIN showroom_batches b ON b.production_order_id = a.production_order_id
                 WHERE b.status = ?1",
                &[status],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let mut breakdowns: HashMap<String, MachineBreakdown> = HashMap::new();
        for row in &rows {
            let po = row
                .get_str("po")
                .ok_or_else(|| ServiceError::Storage("missing po column".into()))?;
            let machine: Machine = decode(row)?;
            let counts = breakdowns.entry(po.to_string()).or_default();
            counts.total += 1;
            if machine.is_in_rework() {
                counts.in_rework += 1;
            } else if machine.showroom_state == ShowroomState::Rework {
                counts.pending_retest += 1;
            }
        }
        Ok((batches, breakdowns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestResult::{Fail, Pass};
    use crate::service::test_support::{assembled_order, mark, service};

    #[test]
    fn orders_of_one_production_order_share_a_batch() {
        let svc = service();
        let a = assembled_order(&svc, "po-1", 2);
        let b = assembled_order(&svc, "po-1", 3);
        mark(&svc, &a.id, &[Pass, Pass]);
        mark(&svc, &b.id, &[Pass, Fail, Pass]);
        svc.process_failures(&a.id, "qa").unwrap();
        svc.process_failures(&b.id, "qa").unwrap();

        let batch = svc.batch_for("po-1").unwrap().unwrap();
        assert_eq!(batch.original_quantity, 5);
        assert_eq!(batch.display_quantity, 4);
        assert_eq!(batch.rework_quantity, 1);
        assert_eq!(batch.name, "Power Tiller T-200");
    }

    #[test]
    fn available_listing_reports_pending_retest() {
        let svc = service();
        let order = assembled_order(&svc, "po-2", 3);
        mark(&svc, &order.id, &[Pass, Fail, Pass]);
        svc.process_failures(&order.id, "qa").unwrap();

        let listed = svc.list_available().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].available_quantity, 2);
        assert_eq!(listed[0].pending_retest_quantity, 0);

        let ro = svc.list_rework_orders(false).unwrap().remove(0);
        svc.complete_rework(&ro.id, "fitter", None, HashMap::new()).unwrap();
        let listed = svc.list_available().unwrap();
        assert_eq!(listed[0].pending_retest_quantity, 1);

        let json = serde_json::to_value(&listed[0]).unwrap();
        assert_eq!(json["availableQuantity"], 2);
        assert_eq!(json["reworkQuantity"], 1);
        assert_eq!(json["showroomStatus"], "available");
    }

    #[test]
    fn displayed_view_breaks_down_units() {
        let svc = service();
        let a = assembled_order(&svc, "po-6", 3);
        let b = assembled_order(&svc, "po-6", 2);
        mark(&svc, &a.id, &[Pass, Fail, Pass]);
        mark(&svc, &b.id, &[Fail, Pass]);
        svc.process_failures(&a.id, "qa").unwrap();
        svc.process_failures(&b.id, "qa").unwrap();
        assembled_order(&svc, "po-7", 1);

        let shown = svc.list_displayed().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(
            shown[0].machine_breakdown,
            MachineBreakdown { total: 5, displayed: 3, in_rework: 2, pending_retest: 0 }
        );

        let ro = svc
            .list_rework_orders(false)
            .unwrap()
            .into_iter()
            .find(|r| r.original_assembly_order_id == a.id)
            .unwrap();
        svc.complete_rework(&ro.id, "fitter", None, HashMap::new()).unwrap();
        let shown = svc.list_displayed().unwrap();
        assert_eq!(
            shown[0].machine_breakdown,
            MachineBreakdown { total: 5, displayed: 3, in_rework: 1, pending_retest: 1 }
        );

        let json = serde_json::to_value(&shown[0]).unwrap();
        assert_eq!(json["machineBreakdown"]["inRework"], 1);
        assert_eq!(json["machineBreakdown"]["pendingRetest"], 1);
        assert_eq!(json["productionOrderId"], "po-6");
        assert_eq!(json["salePrice"], 150.0);
    }

    #[test]
    fn new_batches_are_priced_and_repricing_is_kept() {
        let svc = service();
        let order = assembled_order(&svc, "po-8", 2);
        mark(&svc, &order.id, &[Pass, Fail]);
        svc.process_failures(&order.id, "qa").unwrap();
        let batch = svc.batch_for("po-8").unwrap().unwrap();
        assert_eq!((batch.cost_price, batch.sale_price), (DEFAULT_UNIT_COST, 150.0));

        let err = svc
            .update_pricing(
                &batch.id,
                PricingUpdate {
                    sale_price: Some(-5.0),
                    updated_by: "sales".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let repriced = svc
            .update_pricing(
                &batch.id,
                PricingUpdate {
                    sale_price: Some(199.0),
                    updated_by: "sales".into(),
                    version: Some(batch.version),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!((repriced.cost_price, repriced.sale_price), (100.0, 199.0));
        assert_eq!(repriced.version, batch.version + 1);

        let stale = svc.update_pricing(
            &batch.id,
            PricingUpdate {
                cost_price: Some(1.0),
                updated_by: "sales".into(),
                version: Some(batch.version),
                ..Default::default()
            },
        );
        assert!(matches!(stale, Err(ServiceError::ConcurrentModification(_))));

        // A later promotion into the same batch leaves the price alone.
        let ro = svc.list_rework_orders(false).unwrap().remove(0);
        svc.complete_rework(&ro.id, "fitter", None, HashMap::new()).unwrap();
        mark(&svc, &order.id, &[Pass, Pass]);
        svc.process_failures(&order.id, "qa").unwrap();
        let batch = svc.get_batch(&batch.id).unwrap();
        assert_eq!(batch.display_quantity, 2);
        assert_eq!(batch.sale_price, 199.0);
    }

    #[test]
    fn sales_keep_the_partition() {
        let svc = service();
        let order = assembled_order(&svc, "po-3", 3);
        mark(&svc, &order.id, &[Pass, Pass, Fail]);
        svc.process_failures(&order.id, "qa").unwrap();
        let batch = svc.batch_for("po-3").unwrap().unwrap();

        let err = svc.record_sale(&batch.id, 3, "sales", None).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let sold = svc.record_sale(&batch.id, 2, "sales", Some(batch.version)).unwrap();
        assert_eq!(
            (sold.display_quantity, sold.rework_quantity, sold.sold_quantity),
            (0, 1, 2)
        );
        assert_eq!(sold.showroom_status, ShowroomStatus::InRework);
        sold.check_invariant().unwrap();
        assert!(svc.list_available().unwrap().is_empty());

        // The reworked unit comes back and goes on display.
        let ro = svc.list_rework_orders(false).unwrap().remove(0);
        svc.complete_rework(&ro.id, "fitter", None, HashMap::new()).unwrap();
        mark(&svc, &order.id, &[Pass, Pass, Pass]);
        svc.process_failures(&order.id, "qa").unwrap();
        let batch = svc.get_batch(&batch.id).unwrap();
        assert_eq!(
            (batch.original_quantity, batch.display_quantity, batch.rework_quantity, batch.sold_quantity),
            (3, 1, 0, 2)
        );
    }

    #[test]
    fn stale_sale_is_rejected() {
        let svc = service();
        let order = assembled_order(&svc, "po-4", 2);
        mark(&svc, &order.id, &[Pass, Pass]);
        svc.process_failures(&order.id, "qa").unwrap();
        let batch = svc.batch_for("po-4").unwrap().unwrap();

        svc.record_sale(&batch.id, 1, "sales", None).unwrap();
        let err = svc
            .record_sale(&batch.id, 1, "sales", Some(batch.version))
            .unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(_)));
    }

    #[test]
    fn corrupted_batch_fails_closed() {
        let svc = service();
        let a = assembled_order(&svc, "po-5", 1);
        mark(&svc, &a.id, &[Pass]);
        svc.process_failures(&a.id, "qa").unwrap();

        // Break the partition behind the service's back.
        let mut batch = svc.batch_for("po-5").unwrap().unwrap();
        batch.display_quantity = 7;
        let data = serde_json::to_string(&batch).unwrap();
        svc.sql
            .exec(
                "UPDATE showroom_batches SET data = ?1 WHERE id = ?2",
                &[Value::Text(data), Value::from(batch.id.as_str())],
            )
            .unwrap();

        let b = assembled_order(&svc, "po-5", 1);
        mark(&svc, &b.id, &[Pass]);
        let err = svc.process_failures(&b.id, "qa").unwrap_err();
        assert!(matches!(err, ServiceError::InvariantViolation(_)));

        // Nothing of the failed promotion is visible.
        let m = svc.list_machines(&b.id).unwrap().remove(0);
        assert_eq!(m.showroom_state, ShowroomState::Unaccounted);
        assert_eq!(svc.batch_for("po-5").unwrap().unwrap().display_quantity, 7);
    }
}
