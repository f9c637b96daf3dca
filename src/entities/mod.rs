// Entity Models - OKR domain
// Objectives own key results; key results own checkpoints and actions.
//
// Each entity has:
// - Stable identity (UUID) that NEVER changes
// - Values that change through explicit operations (checkpoint updates, reschedules)
// - Derived numbers (progress, tier) computed on read, never stored as truth

pub mod objective;
pub mod key_result;
pub mod action;

pub use objective::{HierarchyFilter, Objective, OrgUnit};
pub use key_result::{Checkpoint, CheckpointStatus, KeyResult, KeyResultSummary};
pub use action::{Action, ActionStatus};
