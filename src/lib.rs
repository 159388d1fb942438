pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gate;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod workspace;
