//! Worker dispatch: patterns, task contracts, verdict parsing, recovery.
//!
//! The coordinator owns the choice between five dispatch patterns
//! (synchronous, asynchronous, parallel fan-out, sequential chain,
//! convergent review) and the bounded-retry recovery loop around a single
//! task. Workers are external collaborators behind the [`worker::Worker`]
//! trait; this module never assumes what runs on the other side.

pub mod coordinator;
pub mod process;
pub mod recovery;
pub mod task;
pub mod verdict;
pub mod worker;

pub use coordinator::{
    AsyncDispatch, ChainStep, ConvergentReview, Coordinator, ReviewAngle, TaskResult,
};
pub use recovery::{
    AttemptRecord, Escalation, FailureClass, MAX_RETRIES, RecoveryAction, RecoveryOutcome,
    run_with_recovery,
};
pub use process::ProcessWorker;
pub use task::{Capability, PermissionMode, TaskSpec};
pub use verdict::{CriterionNote, GateVerdict};
pub use worker::{Worker, WorkerFailure, WorkerOutcome};
