//! # chime-core
//!
//! Foundation types for the Chime agent-creation pipeline.
//!
//! This crate provides the shared vocabulary that all other Chime crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::RunId`], [`ids::SessionId`], [`ids::AgentId`] as newtypes
//! - **Errors**: [`errors::PipelineError`] taxonomy via `thiserror`
//! - **Progress**: [`progress::ProgressSession`] and its event log
//! - **Requests/results**: [`agent::AgentCreationRequest`], [`agent::AgentCreationResult`]
//! - **Timestamps**: [`timestamp::now_rfc3339`] millisecond-precision UTC strings
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other chime crates.

#![deny(unsafe_code)]

pub mod agent;
pub mod errors;
pub mod ids;
pub mod progress;
pub mod timestamp;
