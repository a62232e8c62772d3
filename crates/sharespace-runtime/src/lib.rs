//! Sharespace Runtime - Per-turn conflict orchestration
//!
//! Every turn the orchestrator runs these stages:
//! 1. Apply pending roster changes
//! 2. Check skip conditions (reset, pause, cool-down, queue)
//! 3. Collect votes for the current state
//! 4. Aggregate and filter candidates
//! 5. Select a winner and negotiate its timing
//! 6. Commit the move and build transition frames
//! 7. Emit events and state summaries
//!
//! The worker drives the orchestrator from a tokio interval and talks to the
//! rest of the system through channels.

pub mod config;
pub mod telemetry;
pub mod frames;
pub mod messages;
pub mod orchestrator;
pub mod worker;

pub use config::*;
pub use telemetry::*;
pub use frames::*;
pub use messages::*;
pub use orchestrator::*;
pub use worker::*;
