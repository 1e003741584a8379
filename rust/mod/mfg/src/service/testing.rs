use serde::Serialize;
use tracing::debug;

use openerp_core::ServiceError;

use crate::model::{AssemblyOrder, Machine, ReworkOrder, TestResult};
use super::lock::order_key;
use super::MfgService;

/// Test progress of one assembly order, computed from current machine and
/// rework state on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestingSummary {
    pub total_machines: u32,
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
    /// Failed machines already held by an open rework order.
    pub failed_in_rework: u32,
    /// Every currently failed machine belongs to an open rework order.
    pub failed_machines_in_rework: bool,
    pub all_tested: bool,
    pub can_proceed: bool,
}

impl TestingSummary {
    pub fn compute(machines: &[Machine], open_reworks: &[ReworkOrder]) -> Self {
        let mut s = TestingSummary {
            total_machines: machines.len() as u32,
            ..Default::default()
        };
        for m in machines {
            match m.test_result {
                TestResult::Pass => s.passed += 1,
                TestResult::Pending => s.pending += 1,
                TestResult::Fail => {
                    s.failed += 1;
                    let held = m
                        .rework_order_id
                        .as_deref()
                        .is_some_and(|ro| open_reworks.iter().any(|r| r.id == ro && r.contains(&m.id)));
                    if held {
                        s.failed_in_rework += 1;
                    }
                }
            }
        }
        s.failed_machines_in_rework = s.failed_in_rework == s.failed;
        s.all_tested = s.total_machines > 0 && s.pending == 0;
        s.can_proceed = s.all_tested && (s.failed == 0 || s.failed_machines_in_rework);
        s
    }
}

impl MfgService {
    // ── Testing ──

    pub fn summarize(&self, assembly_order_id: &str) -> Result<TestingSummary, ServiceError> {
        let _: AssemblyOrder = self.get(assembly_order_id)?;
        // Read machines and rework orders under the order lock so a
        // concurrent hand-off is never half visible.
        let summary = self.locks.with(&order_key(assembly_order_id), || {
            let machines = self.machines_of(assembly_order_id)?;
            let open = self.open_rework_orders(assembly_order_id)?;
            Ok::<_, ServiceError>(TestingSummary::compute(&machines, &open))
        })?;
        debug!(order = %assembly_order_id, ?summary, "testing summary");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReworkStatus, ShowroomState};
    use crate::service::test_support::{assembled_order, mark, service};

    fn machine(id: &str, result: TestResult, rework: Option<&str>) -> Machine {
        Machine {
            id: id.into(),
            assembly_order_id: "ao".into(),
            machine_number: id.to_uppercase(),
            seq: 0,
            engine_number: None,
            test_result: result,
            notes: None,
            tested_by: None,
            tested_at: None,
            rework_order_id: rework.map(Into::into),
            showroom_state: ShowroomState::Unaccounted,
            created_at: "t".into(),
            updated_at: "t".into(),
            version: 1,
        }
    }

    fn rework(id: &str, held: &[&Machine]) -> ReworkOrder {
        let mut ro = ReworkOrder {
            id: id.into(),
            original_assembly_order_id: "ao".into(),
            product_name: "Tiller".into(),
            status: ReworkStatus::Pending,
            failed_machine_count: 0,
            failed_machines: vec![],
            notes: None,
            created_by: None,
            created_at: "t".into(),
            started_at: None,
            completed_at: None,
            completed_by: None,
            updated_by: None,
            updated_at: "t".into(),
            version: 1,
        };
        ro.extend_with(held);
        ro
    }

    #[test]
    fn pending_blocks_proceed() {
        let ms = vec![
            machine("m1", TestResult::Pass, None),
            machine("m2", TestResult::Pending, None),
        ];
        let s = TestingSummary::compute(&ms, &[]);
        assert_eq!((s.passed, s.failed, s.pending), (1, 0, 1));
        assert!(!s.all_tested);
        assert!(!s.can_proceed);
    }

    #[test]
    fn failures_block_until_held_by_rework() {
        let failed = machine("m2", TestResult::Fail, None);
        let ms = vec![machine("m1", TestResult::Pass, None), failed.clone()];
        let s = TestingSummary::compute(&ms, &[]);
        assert!(!s.failed_machines_in_rework);
        assert!(!s.can_proceed);

        let ro = rework("ro1", &[&failed]);
        let ms = vec![
            machine("m1", TestResult::Pass, None),
            machine("m2", TestResult::Fail, Some("ro1")),
        ];
        let s = TestingSummary::compute(&ms, &[ro]);
        assert_eq!(s.failed_in_rework, 1);
        assert!(s.failed_machines_in_rework);
        assert!(s.can_proceed);
    }

    #[test]
    fn no_machines_cannot_proceed() {
        let s = TestingSummary::compute(&[], &[]);
        assert_eq!(s.total_machines, 0);
        assert!(!s.can_proceed);
    }

    #[test]
    fn counts_always_partition_total() {
        let svc = service();
        let order = assembled_order(&svc, "po-1", 5);
        let sequences: [&[TestResult]; 3] = [
            &[TestResult::Pass, TestResult::Fail, TestResult::Pending, TestResult::Pass, TestResult::Fail],
            &[TestResult::Pending, TestResult::Pending, TestResult::Pass, TestResult::Pass, TestResult::Pending],
            &[TestResult::Fail, TestResult::Fail, TestResult::Fail, TestResult::Pass, TestResult::Pass],
        ];
        for seq in sequences {
            mark(&svc, &order.id, seq);
            let s = svc.summarize(&order.id).unwrap();
            assert_eq!(s.passed + s.failed + s.pending, s.total_machines);
            assert_eq!(s.total_machines, 5);
        }
    }

    #[test]
    fn summary_for_unknown_order_is_not_found() {
        let svc = service();
        assert!(matches!(svc.summarize("missing"), Err(ServiceError::NotFound(_))));
    }
}
