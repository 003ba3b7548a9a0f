use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::{sse_events, viewer_feed},
    state::{
        SharedState,
        match_state::MatchKey,
        session::{Language, MatchSession},
    },
};

const FORWARD_BUFFER: usize = 8;

/// Open a viewer stream: handshake, then snapshots, cues and match-wide events.
pub async fn open_viewer_stream(state: SharedState, key: MatchKey) -> mpsc::Receiver<ServerEvent> {
    let session = state.attach_session(&key);
    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);

    let handshake = Handshake {
        stream: "viewer".into(),
        message: format!("viewing match {key}"),
        degraded: state.is_degraded().await,
        language: session.language(),
        token: None,
    };
    if let Some(event) = sse_events::handshake_event(&handshake) {
        let _ = tx.try_send(event);
    }

    let poll_every = state.config().viewer_poll_interval;
    tokio::spawn(async move {
        viewer_feed::run_viewer(state.clone(), session.clone(), tx, poll_every).await;
        state.detach_session(&session);
        info!(%key, "viewer SSE stream disconnected");
    });

    rx
}

/// Open the exclusive controller stream of a match.
///
/// Fails with [`ServiceError::Unauthorized`] while another controller stream is
/// connected. The handshake carries the lease token the controller must present
/// on every REST call; it is released when the stream closes.
pub async fn open_controller_stream(
    state: SharedState,
    key: MatchKey,
    language: Option<Language>,
) -> Result<mpsc::Receiver<ServerEvent>, ServiceError> {
    let session = state.attach_session(&key);
    let token = match claim_controller_token(&session).await {
        Ok(token) => token,
        Err(err) => {
            state.detach_session(&session);
            return Err(err);
        }
    };
    let receiver = session.channels().controller().hub().subscribe();
    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);

    if let Some(language) = language {
        if session.set_language(language) {
            sse_events::broadcast_language_changed(&session, language);
        }
    }

    let handshake = Handshake {
        stream: "controller".into(),
        message: format!("controlling match {key}"),
        degraded: state.is_degraded().await,
        language: session.language(),
        token: Some(token),
    };
    let mut initial: Vec<ServerEvent> =
        sse_events::handshake_event(&handshake).into_iter().collect();
    if let Some(snapshot) = session.snapshot().await {
        initial.extend(sse_events::snapshot_event(&snapshot));
    }
    for event in initial {
        let _ = tx.try_send(event);
    }

    info!(%key, "controller SSE stream connected");
    tokio::spawn(forward_controller(state, receiver, tx, session));
    Ok(rx)
}

/// Forward controller events until the client disconnects, then release the lease.
async fn forward_controller(
    state: SharedState,
    mut receiver: broadcast::Receiver<ServerEvent>,
    tx: mpsc::Sender<ServerEvent>,
    session: Arc<MatchSession>,
) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            recv_result = receiver.recv() => {
                match recv_result {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                    // Skip lagged messages but keep the stream alive.
                    Err(RecvError::Lagged(_)) => continue,
                }
            }
        }
    }

    reset_controller_token(&session).await;
    state.detach_session(&session);
    info!(key = %session.key(), "controller SSE stream disconnected");
}

/// Turn a per-connection channel into an SSE response with keep-alives.
pub fn to_sse_stream(
    rx: mpsc::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|payload| {
        let mut event = Event::default().data(payload.data);
        if let Some(name) = payload.event {
            event = event.event(name);
        }
        Ok(event)
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Reserve the controller lease, failing if another stream already holds it.
async fn claim_controller_token(session: &MatchSession) -> Result<String, ServiceError> {
    let mut guard = session.channels().controller().token().lock().await;
    match &mut *guard {
        slot @ None => {
            let token = Uuid::new_v4().simple().to_string();
            slot.replace(token.clone());
            Ok(token)
        }
        Some(_) => Err(ServiceError::Unauthorized(format!(
            "another controller is already connected to match {}",
            session.key()
        ))),
    }
}

async fn reset_controller_token(session: &MatchSession) {
    let mut guard = session.channels().controller().token().lock().await;
    guard.take();
}

/// Check the lease token presented on a controller request.
pub async fn verify_controller_token(
    session: &MatchSession,
    presented: Option<&str>,
) -> Result<(), ServiceError> {
    let guard = session.channels().controller().token().lock().await;
    match (guard.as_deref(), presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        (None, _) => Err(ServiceError::Unauthorized(
            "no controller stream is connected to this match".into(),
        )),
        _ => Err(ServiceError::Unauthorized("invalid controller token".into())),
    }
}
