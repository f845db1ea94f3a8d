//! # Orchestrator Testing Utils
//!
//! Shared testing utilities for the service orchestration workspace.
//! Registry, scheduler and recovery tests all lean on the same doubles for the
//! injected collaborators.
//!
//! ## Features
//!
//! - **RecordingNotifier**: keeps every notification for later assertions
//! - **ScriptedHealthChecker**: health checker whose answer is set by the test
//! - **ManualCronRunner**: cron runner driven explicitly with `fire`/`trigger`
//! - **Builders**: service registrations with sensible defaults
//! - **Helpers**: polling helpers that work with tokio's paused clock
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
