use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use openerp_core::{new_id, now_rfc3339, ServiceError};
use openerp_sql::Value;

use crate::model::{
    resource, AssemblyOrder, Machine, OrderStatus, PromotionDelta, ReworkOrder, ReworkStatus,
    ShowroomBatch, ShowroomState, TestResult,
};
use super::lock::{order_key, showroom_key};
use super::testing::TestingSummary;
use super::{check_version, MfgService, WriteSet};

/// Result of handing a tested batch over to rework and showroom.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProcessOutcome {
    /// Some units failed; they are (now) held by the open rework order.
    #[serde(rename_all = "camelCase")]
    Rework {
        failed_machines: Vec<Machine>,
        rework_order: ReworkOrder,
        summary: TestingSummary,
        message: String,
        /// Passing units moved onto display by this call.
        promoted_machines: u32,
    },
    /// Every remaining unit passed.
    #[serde(rename_all = "camelCase")]
    Promoted {
        message: String,
        promoted: bool,
        summary: TestingSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        showroom_batch: Option<ShowroomBatch>,
        promoted_machines: u32,
    },
}

impl ProcessOutcome {
    pub fn summary(&self) -> &TestingSummary {
        match self {
            Self::Rework { summary, .. } | Self::Promoted { summary, .. } => summary,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReworkCompletion {
    pub message: String,
    pub rework_order_id: String,
    pub original_assembly_order_id: String,
    pub machines_returned: u32,
}

#[derive(Debug, Default)]
pub struct ReworkUpdate {
    pub status: Option<ReworkStatus>,
    pub notes: Option<String>,
    pub updated_by: String,
    pub version: Option<i64>,
}

impl MfgService {
    // ── Rework ──

    /// Hand failed units of a fully tested order to rework and promote the
    /// passing ones. Safe to call repeatedly: a call with no new test
    /// results changes nothing and reports the same summary.
    pub fn process_failures(
        &self,
        assembly_order_id: &str,
        processed_by: &str,
    ) -> Result<ProcessOutcome, ServiceError> {
        if processed_by.trim().is_empty() {
            return Err(ServiceError::Validation("processedBy is required".into()));
        }

        self.locks.with(&order_key(assembly_order_id), || {
            let mut order: AssemblyOrder = self.get(assembly_order_id)?;
            if !order.status.is_assembled() {
                return Err(ServiceError::InvalidTransition(format!(
                    "assembly order {} is {}, testing starts after completion",
                    order.id, order.status
                )));
            }

            let mut machines = self.machines_of(&order.id)?;
            if machines.is_empty() {
                return Err(ServiceError::InvalidTransition(format!(
                    "assembly order {} has no machines to process",
                    order.id
                )));
            }
            let mut open = self.open_rework_orders(&order.id)?.into_iter().next();
            let before = TestingSummary::compute(&machines, open.as_slice());
            if before.pending > 0 {
                return Err(ServiceError::TestingIncomplete(format!(
                    "{} of {} machines of assembly order {} are still untested",
                    before.pending, before.total_machines, order.id
                )));
            }

            self.locks.with(&showroom_key(&order.production_order_id), || {
                let now = now_rfc3339();
                let original = machines.clone();
                let mut writes = WriteSet::default();

                self.hand_off_failures(&order, &mut machines, &mut open, processed_by, &now, &mut writes)?;

                let existing = self.batch_for(&order.production_order_id)?;
                let delta = account_machines(&mut machines, existing.is_some());
                let batch = if delta.is_empty() {
                    existing
                } else {
                    Some(self.promote(&order, existing, &delta, processed_by, &now, &mut writes)?)
                };

                for (m, was) in machines.iter_mut().zip(&original) {
                    if m != was {
                        writes.update(m, &now)?;
                    }
                }

                let mut order_changed = false;
                if order.status == OrderStatus::Completed
                    && machines.iter().all(|m| m.test_result == TestResult::Fail && m.is_in_rework())
                {
                    order.status = OrderStatus::Rework;
                    order_changed = true;
                }
                if !order.testing_passed
                    && machines.iter().all(|m| m.showroom_state == ShowroomState::Displayed)
                {
                    order.testing_passed = true;
                    order_changed = true;
                }
                if order_changed {
                    order.updated_by = Some(processed_by.to_string());
                    writes.update(&mut order, &now)?;
                    writes.audit(
                        "update",
                        resource::ASSEMBLY_ORDER,
                        &order.id,
                        format!(
                            "status {}, testing passed {}",
                            order.status, order.testing_passed
                        ),
                        Some(processed_by),
                        &now,
                    )?;
                }

                if writes.is_empty() {
                    debug!(order = %order.id, "process failures: nothing new");
                }
                self.commit(writes)?;

                let summary = TestingSummary::compute(&machines, open.as_slice());
                let promoted_machines = delta.passing();
                let outcome = match open {
                    Some(rework_order) if summary.failed > 0 => {
                        let failed_machines: Vec<Machine> = machines
                            .into_iter()
                            .filter(|m| m.test_result == TestResult::Fail)
                            .collect();
                        ProcessOutcome::Rework {
                            message: format!(
                                "{} failed machines held by rework order {}",
                                failed_machines.len(),
                                rework_order.id
                            ),
                            failed_machines,
                            rework_order,
                            summary,
                            promoted_machines,
                        }
                    }
                    _ => ProcessOutcome::Promoted {
                        message: format!(
                            "all {} machines passed and are on display",
                            summary.total_machines
                        ),
                        promoted: true,
                        summary,
                        showroom_batch: batch,
                        promoted_machines,
                    },
                };
                Ok(outcome)
            })
        })
    }

    /// Put newly failed units into the open rework order, creating it when
    /// none is open.
    fn hand_off_failures(
        &self,
        order: &AssemblyOrder,
        machines: &mut [Machine],
        open: &mut Option<ReworkOrder>,
        by: &str,
        now: &str,
        writes: &mut WriteSet,
    ) -> Result<(), ServiceError> {
        let newly_failed: Vec<&Machine> = machines
            .iter()
            .filter(|m| m.test_result == TestResult::Fail && !m.is_in_rework())
            .collect();
        if newly_failed.is_empty() {
            return Ok(());
        }

        let (mut rework, created) = match open.take() {
            Some(ro) => (ro, false),
            None => (
                ReworkOrder {
                    id: new_id(),
                    original_assembly_order_id: order.id.clone(),
                    product_name: order.product_name.clone(),
                    status: ReworkStatus::Pending,
                    failed_machine_count: 0,
                    failed_machines: Vec::new(),
                    notes: None,
                    created_by: Some(by.to_string()),
                    created_at: now.to_string(),
                    started_at: None,
                    completed_at: None,
                    completed_by: None,
                    updated_by: None,
                    updated_at: now.to_string(),
                    version: 0,
                },
                true,
            ),
        };
        let added = rework.extend_with(&newly_failed);

        for m in machines
            .iter_mut()
            .filter(|m| m.test_result == TestResult::Fail && !m.is_in_rework())
        {
            m.rework_order_id = Some(rework.id.clone());
        }

        if created {
            writes.insert(&mut rework)?;
        } else {
            rework.updated_by = Some(by.to_string());
            writes.update(&mut rework, now)?;
        }
        writes.audit(
            if created { "create" } else { "extend" },
            resource::REWORK_ORDER,
            &rework.id,
            format!(
                "{} failed machines from assembly order {} ({} total)",
                added, order.id, rework.failed_machine_count
            ),
            Some(by),
            now,
        )?;

        info!(
            rework = %rework.id,
            order = %order.id,
            added,
            total = rework.failed_machine_count,
            created,
            "failed machines handed to rework"
        );
        *open = Some(rework);
        Ok(())
    }

    /// Close a rework order and release its machines for re-test.
    ///
    /// `engine_numbers` maps machine id to a corrected engine number; units
    /// without an entry get their engine number cleared.
    pub fn complete_rework(
        &self,
        id: &str,
        completed_by: &str,
        notes: Option<String>,
        engine_numbers: HashMap<String, String>,
    ) -> Result<ReworkCompletion, ServiceError> {
        if completed_by.trim().is_empty() {
            return Err(ServiceError::Validation("completedBy is required".into()));
        }
        let order_id = self.open_rework(id)?.original_assembly_order_id;

        self.locks.with(&order_key(&order_id), || {
            let mut rework = self.open_rework(id)?;
            if let Some(unknown) = engine_numbers.keys().find(|k| !rework.contains(k)) {
                return Err(ServiceError::Validation(format!(
                    "machine {unknown} is not part of rework order {id}"
                )));
            }

            let now = now_rfc3339();
            let mut writes = WriteSet::default();
            let note = match notes.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => format!("Reworked: {n}"),
                _ => "Reworked".to_string(),
            };

            let mut returned = 0u32;
            for mut m in self.machines_of(&order_id)? {
                if m.rework_order_id.as_deref() != Some(id) {
                    continue;
                }
                m.test_result = TestResult::Pending;
                m.tested_at = None;
                m.rework_order_id = None;
                m.engine_number = engine_numbers.get(&m.id).cloned();
                m.notes = Some(note.clone());
                writes.update(&mut m, &now)?;
                returned += 1;
            }

            rework.status = ReworkStatus::Completed;
            rework.completed_at = Some(now.clone());
            rework.completed_by = Some(completed_by.to_string());
            rework.updated_by = Some(completed_by.to_string());
            if notes.is_some() {
                rework.notes = notes.clone();
            }
            writes.update(&mut rework, &now)?;
            writes.audit(
                "complete",
                resource::REWORK_ORDER,
                &rework.id,
                format!("{returned} machines returned for re-test"),
                Some(completed_by),
                &now,
            )?;

            let mut order: AssemblyOrder = self.get(&order_id)?;
            if order.status == OrderStatus::Rework {
                order.status = OrderStatus::Completed;
                order.updated_by = Some(completed_by.to_string());
                writes.update(&mut order, &now)?;
                writes.audit(
                    "update",
                    resource::ASSEMBLY_ORDER,
                    &order.id,
                    "status rework -> completed".into(),
                    Some(completed_by),
                    &now,
                )?;
            }

            self.commit(writes)?;
            info!(rework = %id, order = %order_id, returned, "rework completed");

            Ok(ReworkCompletion {
                message: format!("rework completed, {returned} machines returned for re-test"),
                rework_order_id: rework.id,
                original_assembly_order_id: order_id.clone(),
                machines_returned: returned,
            })
        })
    }

    /// Operator status change on an open rework order: only
    /// `pending -> in_progress`. Completion goes through [`complete_rework`].
    ///
    /// [`complete_rework`]: MfgService::complete_rework
    pub fn update_rework_status(
        &self,
        id: &str,
        update: ReworkUpdate,
    ) -> Result<ReworkOrder, ServiceError> {
        let order_id = self.get_rework_order(id)?.original_assembly_order_id;

        self.locks.with(&order_key(&order_id), || {
            let mut rework: ReworkOrder = self.get(id)?;
            check_version(&rework, update.version)?;
            if !rework.status.is_open() {
                return Err(ServiceError::InvalidTransition(format!(
                    "rework order {id} is already completed"
                )));
            }

            let now = now_rfc3339();
            let before = rework.status;
            let mut changed = false;
            match update.status {
                None => {}
                Some(s) if s == rework.status => {}
                Some(ReworkStatus::InProgress) if rework.status == ReworkStatus::Pending => {
                    rework.status = ReworkStatus::InProgress;
                    rework.started_at = Some(now.clone());
                    changed = true;
                }
                Some(ReworkStatus::Completed) => {
                    return Err(ServiceError::InvalidTransition(format!(
                        "rework order {id} is completed through its complete action"
                    )));
                }
                Some(s) => {
                    return Err(ServiceError::InvalidTransition(format!(
                        "cannot move rework order {id} from {} to {s}",
                        rework.status
                    )));
                }
            }
            if let Some(notes) = update.notes {
                if rework.notes.as_deref() != Some(notes.as_str()) {
                    rework.notes = Some(notes);
                    changed = true;
                }
            }
            if !changed {
                return Ok(rework);
            }

            let by = Some(update.updated_by.as_str()).filter(|b| !b.is_empty());
            rework.updated_by = by.map(str::to_string);
            let mut writes = WriteSet::default();
            writes.update(&mut rework, &now)?;
            writes.audit(
                "update",
                resource::REWORK_ORDER,
                &rework.id,
                format!("status {before} -> {}", rework.status),
                by,
                &now,
            )?;
            self.commit(writes)?;

            info!(rework = %id, status = %rework.status, "rework order updated");
            Ok(rework)
        })
    }

    /// Rework orders, newest first. Only open ones unless `include_completed`.
    pub fn list_rework_orders(&self, include_completed: bool) -> Result<Vec<ReworkOrder>, ServiceError> {
        let all: Vec<ReworkOrder> = self.find(&[], "created_at DESC, id")?;
        Ok(all
            .into_iter()
            .filter(|r| include_completed || r.status.is_open())
            .collect())
    }

    pub fn get_rework_order(&self, id: &str) -> Result<ReworkOrder, ServiceError> {
        self.get(id)
    }

    pub(crate) fn open_rework_orders(
        &self,
        assembly_order_id: &str,
    ) -> Result<Vec<ReworkOrder>, ServiceError> {
        let all: Vec<ReworkOrder> = self.find(
            &[("assembly_order_id", Value::from(assembly_order_id))],
            "created_at, id",
        )?;
        Ok(all.into_iter().filter(|r| r.status.is_open()).collect())
    }

    /// An open rework order. A completed one reads as not found, so a
    /// repeated completion can never release machines twice.
    fn open_rework(&self, id: &str) -> Result<ReworkOrder, ServiceError> {
        let rework: ReworkOrder = self.get(id)?;
        if !rework.status.is_open() {
            return Err(ServiceError::NotFound(format!(
                "open rework order {id} not found (already completed)"
            )));
        }
        Ok(rework)
    }
}

/// Decide how each unit is counted in the showroom batch and move its
/// `showroom_state` accordingly.
///
/// Failed units are only tracked as rework inventory once a batch exists
/// or is about to be created by passing units; otherwise they stay
/// unaccounted and count as new display units when they pass later.
fn account_machines(machines: &mut [Machine], batch_exists: bool) -> PromotionDelta {
    let passing = machines
        .iter()
        .any(|m| m.test_result == TestResult::Pass && m.showroom_state != ShowroomState::Displayed);
    let track_rework = batch_exists || passing;

    let mut delta = PromotionDelta::default();
    for m in machines.iter_mut() {
        match (m.test_result, m.showroom_state) {
            (TestResult::Pass, ShowroomState::Unaccounted) => {
                delta.new_display += 1;
                m.showroom_state = ShowroomState::Displayed;
            }
            (TestResult::Pass, ShowroomState::Rework) => {
                delta.returned += 1;
                m.showroom_state = ShowroomState::Displayed;
            }
            (TestResult::Fail, ShowroomState::Unaccounted) if track_rework => {
                delta.new_rework += 1;
                m.showroom_state = ShowroomState::Rework;
            }
            _ => {}
        }
    }
    delta
}
