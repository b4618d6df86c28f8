//! Server-Sent Events stream for an edit session

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use redline_session::SessionEvent;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;

/// Wire form of one session event
///
/// Agent stdout goes out as `data` with the raw text. Stderr and terminal
/// failures share the `error` event and are told apart by `terminal`.
pub fn to_sse_event(event: SessionEvent) -> Event {
    match event {
        SessionEvent::Output(text) => Event::default().event("data").data(normalize_newlines(&text)),
        SessionEvent::Diagnostic(text) => Event::default()
            .event("error")
            .data(json!({ "terminal": false, "message": text }).to_string()),
        SessionEvent::Failed { message } => Event::default()
            .event("error")
            .data(json!({ "terminal": true, "message": message }).to_string()),
        SessionEvent::Completed { commit } => Event::default()
            .event("end")
            .data(json!({ "commit": commit }).to_string()),
    }
}

// SSE lines end at CR as well as LF; keep carriage returns out of data fields
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// SSE response relaying a session, with keep-alive comments during silence
///
/// The response ends after the terminal event. If the client goes away the
/// session stream is dropped, which stops the agent.
pub fn edit_stream<S>(
    events: S,
    heartbeat: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = SessionEvent> + Send + 'static,
{
    let stream = events.map(|event| Ok(to_sse_event(event)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("keep-alive"))
}
