mod audit;
mod machine;
mod order;
mod rework;
mod showroom;

pub use audit::{resource, AuditEntry};
pub use machine::{Machine, ShowroomState, TestResult};
pub use order::{AssemblyOrder, Changed, OrderStatus};
pub use rework::{MachineSnapshot, ReworkOrder, ReworkStatus};
pub use showroom::{
    PromotionDelta, ShowroomBatch, ShowroomStatus, DEFAULT_MARKUP, DEFAULT_UNIT_COST,
};
