use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    services::session_service,
    state::{ConnectionRef, SharedState},
};

/// Subscribe to the broadcast room of a session.
pub fn subscribe(state: &SharedState, code: &str) -> broadcast::Receiver<ServerEvent> {
    state.rooms().subscribe(code)
}

/// Record an attached participant stream in the connection index so its
/// teardown can resolve `{code, handle}` in O(1).
pub fn register_connection(state: &SharedState, code: String, handle: Uuid) -> Uuid {
    let connection_id = Uuid::new_v4();
    state
        .connections()
        .insert(connection_id, ConnectionRef { code, handle });
    connection_id
}

/// Identifies the stream so teardown can perform the right bookkeeping when
/// the connection drops.
#[derive(Clone)]
pub enum StreamKind {
    /// Read-only stream with no participant attached.
    Anonymous,
    /// Stream attached to a participant. Carries a clone of the shared state
    /// so teardown can run after the request context is gone; cloning
    /// `SharedState` is cheap because it is just bumping the inner `Arc`.
    Participant {
        /// Shared application state for teardown.
        state: SharedState,
        /// Key into the connection index.
        connection_id: Uuid,
    },
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Anonymous => debug!("anonymous event stream disconnected"),
            StreamKind::Participant {
                state,
                connection_id,
            } => disconnect_participant(state, connection_id).await,
        }
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Resolve the dropped connection through the index and run the departure
/// through the session's serialized path. Errors are logged, not surfaced;
/// there is no caller left to report to.
async fn disconnect_participant(state: SharedState, connection_id: Uuid) {
    let Some((_, connection)) = state.connections().remove(&connection_id) else {
        return;
    };

    let ConnectionRef { code, handle } = connection;
    debug!(%code, %handle, "participant event stream disconnected");

    if let Err(err) = session_service::leave_session(&state, &code, handle).await {
        debug!(%code, %handle, error = %err, "departure cleanup skipped");
    }
}
