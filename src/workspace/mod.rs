//! Workspace isolation: branch-scoped working copies of one shared
//! repository, letting multiple contributors work concurrently without
//! file collisions.

pub mod manager;
pub mod registry;

pub use manager::{
    BranchDisposition, CloseOutcome, DirtyDisposition, WorkspaceInfo, WorkspaceManager,
};
pub use registry::{Resolution, ResolutionStrategy, WorkspaceBinding};
