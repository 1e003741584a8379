use tracing::{debug, info};

use openerp_core::{new_id, now_rfc3339, ServiceError};
use openerp_sql::Value;

use crate::model::{resource, AssemblyOrder, Machine, ShowroomState, TestResult};
use super::lock::order_key;
use super::{check_version, MfgService, WriteSet};

/// Partial machine update. Omitted fields are left unchanged.
#[derive(Debug, Default)]
pub struct MachineUpdate {
    pub test_result: Option<TestResult>,
    pub engine_number: Option<String>,
    pub notes: Option<String>,
    pub tested_by: String,
    pub version: Option<i64>,
}

impl MfgService {
    // ── Machine ──

    /// All machines of an order, ordered by machine number.
    pub fn list_machines(&self, assembly_order_id: &str) -> Result<Vec<Machine>, ServiceError> {
        let _: AssemblyOrder = self.get(assembly_order_id)?;
        let machines = self.machines_of(assembly_order_id)?;
        debug!(order = %assembly_order_id, count = machines.len(), "listed machines");
        Ok(machines)
    }

    pub fn get_machine(&self, id: &str) -> Result<Machine, ServiceError> {
        self.get(id)
    }

    pub fn update_machine(&self, id: &str, update: MachineUpdate) -> Result<Machine, ServiceError> {
        if update.tested_by.trim().is_empty() {
            return Err(ServiceError::Validation("testedBy is required".into()));
        }
        let order_id = self.get_machine(id)?.assembly_order_id;

        self.locks.with(&order_key(&order_id), || {
            let mut machine: Machine = self.get(id)?;
            check_version(&machine, update.version)?;

            let now = now_rfc3339();
            let before = machine.test_result;
            let mut changed = false;

            if let Some(result) = update.test_result {
                if result != machine.test_result {
                    guard_result_change(&machine, result)?;
                    machine.test_result = result;
                    machine.tested_at = Some(now.clone());
                    changed = true;
                }
            }
            if let Some(engine) = update.engine_number {
                let engine = Some(engine).filter(|e| !e.trim().is_empty());
                if engine != machine.engine_number {
                    machine.engine_number = engine;
                    changed = true;
                }
            }
            if let Some(notes) = update.notes {
                if machine.notes.as_deref() != Some(notes.as_str()) {
                    machine.notes = Some(notes);
                    changed = true;
                }
            }
            if !changed {
                return Ok(machine);
            }
            machine.tested_by = Some(update.tested_by.clone());

            let mut writes = WriteSet::default();
            writes.update(&mut machine, &now)?;
            writes.audit(
                "update",
                resource::MACHINE,
                &machine.id,
                format!(
                    "machine {} test result {} -> {}",
                    machine.machine_number, before, machine.test_result
                ),
                Some(&update.tested_by),
                &now,
            )?;
            self.commit(writes)?;

            info!(
                machine = %machine.id,
                number = %machine.machine_number,
                result = %machine.test_result,
                "machine updated"
            );
            Ok(machine)
        })
    }

    pub(crate) fn machines_of(&self, assembly_order_id: &str) -> Result<Vec<Machine>, ServiceError> {
        self.find(
            &[("assembly_order_id", Value::from(assembly_order_id))],
            "seq, machine_number",
        )
    }

    /// Create the order's units on first completion. Never seeds twice.
    pub(crate) fn seed_machines(
        &self,
        order: &AssemblyOrder,
        now: &str,
        writes: &mut WriteSet,
    ) -> Result<(), ServiceError> {
        if !self.machines_of(&order.id)?.is_empty() {
            return Ok(());
        }
        for n in 1..=order.quantity {
            let mut machine = Machine {
                id: new_id(),
                assembly_order_id: order.id.clone(),
                machine_number: Machine::number_for(n),
                seq: n,
                engine_number: None,
                test_result: TestResult::Pending,
                notes: None,
                tested_by: None,
                tested_at: None,
                rework_order_id: None,
                showroom_state: ShowroomState::Unaccounted,
                created_at: now.to_string(),
                updated_at: now.to_string(),
                version: 0,
            };
            writes.insert(&mut machine)?;
        }
        info!(order = %order.id, count = order.quantity, "machines seeded for testing");
        Ok(())
    }
}

fn guard_result_change(machine: &Machine, to: TestResult) -> Result<(), ServiceError> {
    if machine.showroom_state == ShowroomState::Displayed {
        return Err(ServiceError::InvalidTransition(format!(
            "machine {} is on display, its test result is final",
            machine.machine_number
        )));
    }
    if let Some(ref rework) = machine.rework_order_id {
        return Err(ServiceError::InvalidTransition(format!(
            "machine {} is held by open rework order {}",
            machine.machine_number, rework
        )));
    }
    if machine.test_result == TestResult::Fail && to == TestResult::Pass {
        return Err(ServiceError::InvalidTransition(format!(
            "failed machine {} must go through rework before passing",
            machine.machine_number
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{assembled_order, mark, service};

    fn update(result: Option<TestResult>) -> MachineUpdate {
        MachineUpdate {
            test_result: result,
            tested_by: "qa".into(),
            ..Default::default()
        }
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let svc = service();
        assert!(matches!(svc.list_machines("nope"), Err(ServiceError::NotFound(_))));
        assert!(matches!(
            svc.update_machine("nope", update(Some(TestResult::Pass))),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn partial_update_keeps_omitted_fields() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 1);
        let m = &svc.list_machines(&order.id).unwrap()[0];

        let m = svc
            .update_machine(
                &m.id,
                MachineUpdate {
                    engine_number: Some("ENG-1001".into()),
                    notes: Some("clutch ok".into()),
                    tested_by: "qa".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(m.test_result, TestResult::Pending);
        assert!(m.tested_at.is_none());

        let m = svc.update_machine(&m.id, update(Some(TestResult::Pass))).unwrap();
        assert_eq!(m.engine_number.as_deref(), Some("ENG-1001"));
        assert_eq!(m.notes.as_deref(), Some("clutch ok"));
        assert!(m.tested_at.is_some());
        assert_eq!(m.tested_by.as_deref(), Some("qa"));
    }

    #[test]
    fn unchanged_update_is_not_written() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 1);
        mark(&svc, &order.id, &[TestResult::Pass]);
        let m = &svc.list_machines(&order.id).unwrap()[0];
        let again = svc.update_machine(&m.id, update(Some(TestResult::Pass))).unwrap();
        assert_eq!(again.version, m.version);
        assert_eq!(again.tested_at, m.tested_at);
    }

    #[test]
    fn failed_machine_cannot_skip_rework() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 1);
        mark(&svc, &order.id, &[TestResult::Fail]);
        let m = &svc.list_machines(&order.id).unwrap()[0];

        let err = svc.update_machine(&m.id, update(Some(TestResult::Pass))).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        // Manual correction back to pending needs no rework order.
        let m = svc.update_machine(&m.id, update(Some(TestResult::Pending))).unwrap();
        assert_eq!(m.test_result, TestResult::Pending);
    }

    #[test]
    fn machines_held_by_rework_or_on_display_are_frozen() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 2);
        mark(&svc, &order.id, &[TestResult::Pass, TestResult::Fail]);
        svc.process_failures(&order.id, "qa").unwrap();

        let machines = svc.list_machines(&order.id).unwrap();
        for m in &machines {
            let err = svc
                .update_machine(&m.id, update(Some(TestResult::Pending)))
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidTransition(_)));
        }

        // Notes stay editable.
        let m = svc
            .update_machine(
                &machines[0].id,
                MachineUpdate {
                    notes: Some("sold to dealer".into()),
                    tested_by: "qa".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(m.test_result, TestResult::Pass);
    }

    #[test]
    fn stale_version_is_rejected() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 1);
        let m = svc.list_machines(&order.id).unwrap().remove(0);
        svc.update_machine(&m.id, update(Some(TestResult::Pass))).unwrap();

        let err = svc
            .update_machine(
                &m.id,
                MachineUpdate {
                    notes: Some("late edit".into()),
                    tested_by: "qa".into(),
                    version: Some(m.version),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(_)));
    }
}
