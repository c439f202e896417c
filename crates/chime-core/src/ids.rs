//! Branded ID newtypes.
//!
//! IDs are UUID v7 strings wrapped in distinct types so a run ID can never
//! be passed where a session ID is expected. All IDs serialize as plain
//! strings on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh ID (UUID v7, time-ordered).
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Wrap an existing ID string.
            #[must_use]
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// The underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

branded_id!(
    /// Identifies one `create_agent` pipeline run.
    RunId,
    "run"
);

branded_id!(
    /// Identifies a progress session observable over WebSocket.
    SessionId,
    "sess"
);

branded_id!(
    /// Identifies a WebSocket subscriber connection.
    ConnectionId,
    "conn"
);

branded_id!(
    /// Identifies a created agent record.
    AgentId,
    "agent"
);
