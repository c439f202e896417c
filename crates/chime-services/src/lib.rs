//! # chime-services
//!
//! Collaborator clients for the agent-creation pipeline.
//!
//! Each collaborator is an async trait with two implementations:
//!
//! - a **real** client talking to the outside world (HTTP, `SQLite`)
//! - a **mock** client producing deterministic fallback output
//!
//! Callers never branch on the variant; the selection happens once at
//! pipeline construction via [`selection::select_collaborators`], which
//! probes each real client and substitutes the mock when the probe fails.
//!
//! | Module | Collaborator |
//! |--------|--------------|
//! | `crawler` | Website crawling (`reqwest` + `scraper`) |
//! | `knowledge` | Fragment validation, merge, compression |
//! | `voice` | Voice profile configuration (ElevenLabs-style API) |
//! | `phone` | Number search/provision/release (Twilio-style API) |
//! | `store` | Agent persistence (`rusqlite`) |
//! | `selection` | Probe-and-fallback wiring |
//! | `settings` | Layered `ChimeSettings` |

#![deny(unsafe_code)]

pub mod crawler;
pub mod errors;
pub mod knowledge;
pub mod phone;
pub mod selection;
pub mod settings;
pub mod store;
pub mod types;
pub mod voice;

pub use errors::ServiceError;
pub use selection::{Collaborators, ServiceProbe, select_collaborators};
pub use types::ServiceVariant;
