//! # chime-pipeline
//!
//! Orchestration for agent creation.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `stage` | Stage enum, prerequisite graph, per-stage timeouts |
//! | `state` | Per-run bookkeeping: completions, outcomes, rollback resources |
//! | `coordinator` | Legality queries: ready frontier, remaining budget |
//! | `health` | Probe-once service health registry and status report |
//! | `progress_manager` | Session table with idempotent completion and TTL sweep |
//! | `progress_tracker` | Scoped tracking with guaranteed terminal completion |
//! | `pipeline` | [`pipeline::AgentCreationPipeline`] driving it all |
//!
//! ## Data Flow
//!
//! `pipeline` asks `coordinator` for the ready frontier, executes stages
//! against `chime-services` collaborators, commits outcomes into `state`,
//! and reports through `progress_tracker` which fans out via the
//! [`progress_tracker::ProgressBroadcaster`] seam.

#![deny(unsafe_code)]

pub mod coordinator;
pub mod health;
pub mod pipeline;
pub mod progress_manager;
pub mod progress_tracker;
pub mod stage;
pub mod state;

pub use coordinator::PipelineCoordinator;
pub use health::ServiceHealthRegistry;
pub use pipeline::AgentCreationPipeline;
pub use progress_manager::ProgressManager;
pub use progress_tracker::{NoopBroadcaster, ProgressBroadcaster, ProgressTracker};
pub use stage::Stage;
pub use state::PipelineState;
