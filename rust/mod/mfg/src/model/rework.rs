use serde::{Deserialize, Serialize};

use super::machine::Machine;

/// Rework order status.
///
/// ```text
/// PENDING → IN_PROGRESS → COMPLETED
/// PENDING ──────────────→ COMPLETED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReworkStatus {
    Pending,
    InProgress,
    Completed,
}

impl ReworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ReworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable copy of a failed unit taken when it entered rework.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    pub id: String,
    pub machine_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&Machine> for MachineSnapshot {
    fn from(m: &Machine) -> Self {
        Self {
            id: m.id.clone(),
            machine_number: m.machine_number.clone(),
            engine_number: m.engine_number.clone(),
            notes: m.notes.clone(),
        }
    }
}

/// A batch of failed units pulled out of an assembly order for remediation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReworkOrder {
    pub id: String,
    pub original_assembly_order_id: String,
    pub product_name: String,
    pub status: ReworkStatus,
    /// Always equal to `failed_machines.len()`.
    pub failed_machine_count: u32,
    pub failed_machines: Vec<MachineSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

impl ReworkOrder {
    pub fn contains(&self, machine_id: &str) -> bool {
        self.failed_machines.iter().any(|m| m.id == machine_id)
    }

    /// Append snapshots of newly failed units, skipping any already held.
    /// Returns how many were added.
    pub fn extend_with(&mut self, machines: &[&Machine]) -> usize {
        let before = self.failed_machines.len();
        for m in machines {
            if !self.contains(&m.id) {
                self.failed_machines.push(MachineSnapshot::from(*m));
            }
        }
        self.failed_machine_count = self.failed_machines.len() as u32;
        self.failed_machines.len() - before
    }
}
