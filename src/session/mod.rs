//! Per-process-instance session environment management.
//!
//! N concurrently running instances may share one filesystem; each needs
//! its own notion of "which directory am I operating in". Records are keyed
//! by session id so no locking is needed: each session only ever writes and
//! reads its own keyed file.

pub mod env;
pub mod events;
pub mod handoff;

pub use env::{SessionEnvManager, SessionEnvironment};
pub use events::{SessionEvent, SessionHookEvent};
pub use handoff::SessionHandoff;
