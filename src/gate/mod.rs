//! Gate evaluation: deciding whether a stage's artifacts satisfy its
//! criteria set, and mutating the project aggregate accordingly.
//!
//! A failed gate is the expected outcome of an under-specified artifact.
//! It blocks advancement and is recorded as structured issues, never
//! raised as an error.

pub mod criteria;
pub mod evaluator;
pub mod loops;

pub use criteria::{
    Criterion, CriterionResult, CriterionSeverity, CriteriaTable, GateDecision, GateResult,
    Verdict,
};
pub use evaluator::{GateEvaluator, evaluate};
pub use loops::{LoopProposal, LoopRule, LoopTable};
