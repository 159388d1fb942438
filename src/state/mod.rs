//! Workflow state store: the durable, single-source-of-truth record of a
//! project's stage statuses, issues, work units, iterations, and milestones.

pub mod project;
pub mod store;

pub use project::{
    ActiveWorkflow, HistoryEntry, Issue, IssueSeverity, IterationCycle, Milestone, Project,
    WorkUnit, WorkUnitKind, WorkUnitStatus,
};
pub use store::ProjectStore;
