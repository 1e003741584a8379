use serde::{Deserialize, Serialize};

use openerp_core::ServiceError;

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an assembly order.
///
/// ```text
/// PENDING → IN_PROGRESS ⇄ PAUSED
///           IN_PROGRESS → COMPLETED ⇄ REWORK
/// ```
///
/// `REWORK` is entered and left only by the rework coordinator, while every
/// unit of the order sits in an open rework order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    Paused,
    Completed,
    Rework,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Rework => "rework",
        }
    }

    /// Assembly is finished; units are in (or past) testing.
    pub fn is_assembled(&self) -> bool {
        matches!(self, Self::Completed | Self::Rework)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AssemblyOrder
// ---------------------------------------------------------------------------

/// One production batch undergoing assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyOrder {
    pub id: String,
    pub production_order_id: String,
    pub product_name: String,
    /// Number of physical units in the batch.
    pub quantity: u32,

    #[serde(default)]
    pub status: OrderStatus,
    /// Assembly progress, 0..=100.
    #[serde(default)]
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,

    /// Set when assembly completes; read by downstream reporting.
    #[serde(default)]
    pub quality_check: bool,
    /// Set once every unit of the order is on showroom display.
    #[serde(default)]
    pub testing_passed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,

    /// Optimistic lock token, bumped on every write.
    #[serde(default)]
    pub version: i64,
}

/// Result of applying a transition: whether anything changed.
pub type Changed = bool;

impl AssemblyOrder {
    fn invalid(&self, action: &str) -> ServiceError {
        ServiceError::InvalidTransition(format!(
            "cannot {action} assembly order {} in status {}",
            self.id, self.status
        ))
    }

    /// PENDING → IN_PROGRESS. Repeating on an in-progress order is a no-op.
    pub fn start(&mut self, now: &str) -> Result<Changed, ServiceError> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::InProgress;
                if self.started_at.is_none() {
                    self.started_at = Some(now.to_string());
                }
                Ok(true)
            }
            OrderStatus::InProgress => Ok(false),
            _ => Err(self.invalid("start")),
        }
    }

    /// IN_PROGRESS → PAUSED. Repeating on a paused order is a no-op.
    pub fn pause(&mut self, now: &str) -> Result<Changed, ServiceError> {
        match self.status {
            OrderStatus::InProgress => {
                self.status = OrderStatus::Paused;
                self.paused_at = Some(now.to_string());
                Ok(true)
            }
            OrderStatus::Paused => Ok(false),
            _ => Err(self.invalid("pause")),
        }
    }

    /// PAUSED → IN_PROGRESS.
    pub fn resume(&mut self, now: &str) -> Result<Changed, ServiceError> {
        match self.status {
            OrderStatus::Paused => {
                self.status = OrderStatus::InProgress;
                self.resumed_at = Some(now.to_string());
                Ok(true)
            }
            _ => Err(self.invalid("resume")),
        }
    }

    /// Add `delta` percentage points, clamped to 100. Progress never
    /// decreases and only moves while the order is in progress.
    pub fn advance_progress(&mut self, delta: i32) -> Result<Changed, ServiceError> {
        if delta < 0 {
            return Err(ServiceError::Validation(format!(
                "progress delta must not be negative (got {delta})"
            )));
        }
        if self.status != OrderStatus::InProgress {
            return Err(self.invalid("advance progress of"));
        }
        let next = (self.progress as i32 + delta).clamp(0, 100) as u8;
        let changed = next != self.progress;
        self.progress = next;
        Ok(changed)
    }

    /// Set progress to an absolute value. Lower values are rejected.
    pub fn set_progress(&mut self, value: i32) -> Result<Changed, ServiceError> {
        if !(0..=100).contains(&value) {
            return Err(ServiceError::Validation(format!(
                "progress must be between 0 and 100 (got {value})"
            )));
        }
        let value = value as u8;
        if value == self.progress {
            return Ok(false);
        }
        if self.status != OrderStatus::InProgress {
            return Err(self.invalid("change progress of"));
        }
        if value < self.progress {
            return Err(ServiceError::InvalidTransition(format!(
                "progress of assembly order {} cannot decrease from {} to {}",
                self.id, self.progress, value
            )));
        }
        self.progress = value;
        Ok(true)
    }

    /// IN_PROGRESS (at 100%) → COMPLETED. Repeating on an assembled order
    /// is a no-op.
    pub fn complete(&mut self, now: &str) -> Result<Changed, ServiceError> {
        if self.status.is_assembled() {
            return Ok(false);
        }
        if self.status != OrderStatus::InProgress {
            return Err(self.invalid("complete"));
        }
        if self.progress != 100 {
            return Err(ServiceError::InvalidTransition(format!(
                "assembly order {} is at {}%, must reach 100% before completion",
                self.id, self.progress
            )));
        }
        self.status = OrderStatus::Completed;
        self.completed_at = Some(now.to_string());
        self.quality_check = true;
        self.testing_passed = false;
        Ok(true)
    }
}
