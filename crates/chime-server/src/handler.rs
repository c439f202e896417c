//! Client request dispatch.

use tracing::debug;

use chime_pipeline::progress_manager::ProgressManager;

use crate::connection::SubscriberConnection;
use crate::protocol::{ClientMessage, ServerMessage};

/// Handle one raw client frame and produce the reply.
///
/// Malformed JSON and unknown request types become `error` replies; the
/// connection itself is never torn down here.
pub fn dispatch(
    progress: &ProgressManager,
    connection: &SubscriberConnection,
    raw: &str,
) -> ServerMessage {
    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            debug!(conn_id = %connection.id(), error = %e, "malformed client message");
            return ServerMessage::Error {
                message: format!("malformed message: {e}"),
            };
        }
    };

    match message {
        ClientMessage::Subscribe { session_id } => {
            connection.subscribe(session_id.clone());
            let session = progress.get_session_status(&session_id);
            ServerMessage::Subscribed {
                session_id,
                session,
            }
        }
        ClientMessage::Unsubscribe { session_id } => {
            let _ = connection.unsubscribe(&session_id);
            ServerMessage::Unsubscribed { session_id }
        }
        ClientMessage::GetStatus { session_id } => {
            match progress.get_session_status(&session_id) {
                Some(session) => ServerMessage::Status {
                    session: Box::new(session),
                },
                None => ServerMessage::Error {
                    message: format!("unknown session: {session_id}"),
                },
            }
        }
        ClientMessage::GetActiveSessions => {
            let sessions = progress
                .get_active_sessions()
                .iter()
                .filter_map(|id| progress.session_summary(id))
                .collect();
            ServerMessage::ActiveSessions { sessions }
        }
    }
}
