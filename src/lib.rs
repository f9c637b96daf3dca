// OKR Tracker - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod locale;     // Brazilian number/date parsing and display
pub mod schedule;   // Checkpoint distribution over a date range
pub mod progress;   // Progress %, tiers, checkpoint status
pub mod error;
pub mod entities;   // Objective, KeyResult, Checkpoint, Action
pub mod access;     // Role-based write permissions
pub mod db;
pub mod dashboard;
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use db::{
    Event, ImportReport, KeyResultImportRow,
    open_database, setup_database,
    insert_objective, get_objective, get_objectives,
    create_key_result, get_key_result, get_key_results, get_key_results_for_objective,
    reschedule_key_result, count_key_results,
    get_checkpoints, get_checkpoint, record_checkpoint_value,
    insert_action, get_actions, update_action_status,
    insert_event, get_events_for_entity,
    load_import_csv, import_key_results,
};
pub use locale::{
    IntoDecimal, parse_decimal, format_decimal, format_br, format_compact,
    to_canonical, parse_br_date, format_br_date,
};
pub use schedule::{generate_checkpoints, CheckpointPlan, Frequency, ScheduleError};
pub use progress::{
    compute_progress, rollup_progress, classify_status, classify_status_on,
    checkpoint_status, Tier,
};
pub use error::{OkrError, OkrResult};
pub use entities::{
    Objective, OrgUnit, HierarchyFilter,
    KeyResult, KeyResultSummary, Checkpoint, CheckpointStatus,
    Action, ActionStatus,
};
pub use access::{AccessPolicy, Operation, Role, RolePolicy};
pub use dashboard::{DashboardStats, ObjectiveProgress, TierCount};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
