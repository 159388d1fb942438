//! CLI command implementations.
//!
//! | Module      | Commands handled                                      |
//! |-------------|-------------------------------------------------------|
//! | `project`   | `Init`, `Status`                                      |
//! | `workflow`  | `Advance`, `Review`, `Gate`, `WorkUnit`, `Iterate`, `Milestone` |
//! | `workspace` | `Workspace`                                           |
//! | `session`   | `Session`                                             |
//! | `dispatch`  | `Dispatch`                                            |

pub mod dispatch;
pub mod project;
pub mod session;
pub mod workflow;
pub mod workspace;

pub use dispatch::cmd_dispatch;
pub use project::{cmd_init, cmd_status};
pub use session::cmd_session;
pub use workflow::{
    cmd_advance, cmd_gate, cmd_iterate, cmd_milestone, cmd_review, cmd_work_unit,
};
pub use workspace::cmd_workspace;
