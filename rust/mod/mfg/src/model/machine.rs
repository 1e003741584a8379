use serde::{Deserialize, Serialize};

/// Outcome of the post-assembly test for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pending,
    Pass,
    Fail,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl Default for TestResult {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which showroom bucket a unit is currently counted in.
///
/// A unit counted as `Displayed` is frozen; a unit counted as `Rework` moves
/// to `Displayed` once it passes a re-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowroomState {
    Unaccounted,
    Displayed,
    Rework,
}

impl Default for ShowroomState {
    fn default() -> Self {
        Self::Unaccounted
    }
}

/// One physical unit belonging to an assembly order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: String,
    pub assembly_order_id: String,
    /// Unique within the order, e.g. `M001`.
    pub machine_number: String,
    /// 1-based position within the order. Listing order follows this,
    /// not the text of `machine_number`.
    #[serde(default)]
    pub seq: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_number: Option<String>,

    #[serde(default)]
    pub test_result: TestResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tested_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tested_at: Option<String>,

    /// Open rework order currently holding this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rework_order_id: Option<String>,
    #[serde(default)]
    pub showroom_state: ShowroomState,

    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

impl Machine {
    /// Machine number for the `n`-th unit (1-based): `M001`, `M002`, ...
    pub fn number_for(n: u32) -> String {
        format!("M{n:03}")
    }

    pub fn is_in_rework(&self) -> bool {
        self.rework_order_id.is_some()
    }

    /// Whether this unit reached a terminal, accounted-for state in the
    /// current testing cycle: on display, or failed and held by rework.
    pub fn is_settled(&self) -> bool {
        match self.test_result {
            TestResult::Pass => self.showroom_state == ShowroomState::Displayed,
            TestResult::Fail => self.is_in_rework(),
            TestResult::Pending => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_numbers_are_zero_padded() {
        assert_eq!(Machine::number_for(1), "M001");
        assert_eq!(Machine::number_for(42), "M042");
        assert_eq!(Machine::number_for(1200), "M1200");
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let m = Machine {
            id: "m1".into(),
            assembly_order_id: "ao1".into(),
            machine_number: "M001".into(),
            seq: 1,
            engine_number: Some("ENG-77".into()),
            test_result: TestResult::Fail,
            notes: None,
            tested_by: Some("qa".into()),
            tested_at: None,
            rework_order_id: None,
            showroom_state: ShowroomState::Unaccounted,
            created_at: "t".into(),
            updated_at: "t".into(),
            version: 1,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["machineNumber"], "M001");
        assert_eq!(v["engineNumber"], "ENG-77");
        assert_eq!(v["testResult"], "fail");
        assert_eq!(v["showroomState"], "unaccounted");
        assert!(v.get("reworkOrderId").is_none());
    }
}
