// src/server/turn.rs
// POST /turn (§6): SSE when the client asks for it, a single aggregate JSON response otherwise.
// Streaming plumbing follows the donor's `mira-chat/src/server.rs` chat_stream_handler: an
// mpsc channel fed by a spawned task, forwarded through `async_stream::stream!` into `Sse`.

use super::AppState;
use crate::orchestrator::{TurnEvent, TurnRequest};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::convert::Infallible;
use tokio::sync::mpsc;

pub async fn handle_turn(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<TurnRequest>) -> Response {
    let wants_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));

    if wants_stream {
        stream_turn(state, request).into_response()
    } else {
        match aggregate_turn(state, request).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => e.into_response(),
        }
    }
}

async fn aggregate_turn(state: AppState, request: TurnRequest) -> crate::error::Result<crate::orchestrator::TurnResponse> {
    // The conversation id isn't known until the Orchestrator resolves it, so the aggregate path
    // runs the turn once without auto-save, then fires it again as a fire-and-forget write using
    // the id the turn reported — mirroring what the streaming path does inline via the channel.
    let response = state.orchestrator.run_turn(request, None).await?;
    if let Some(options) = state.autosave_options(&response.conversation_id).await {
        let store = state.store.clone();
        let conversation_id = response.conversation_id.clone();
        tokio::spawn(async move {
            if let Err(e) = write_transcript_now(&store, &conversation_id, options).await {
                tracing::warn!(error = %e, conversation_id, "auto-save transcript write failed");
            }
        });
    }
    Ok(response)
}

async fn write_transcript_now(
    store: &crate::store::Store,
    conversation_id: &str,
    options: crate::orchestrator::AutosaveOptions,
) -> crate::error::Result<()> {
    let conversation = store.get_conversation(conversation_id).await?;
    let messages = store.list_messages(conversation_id).await?;
    let display_names = std::collections::HashMap::new();
    let rendered = crate::transcript::render(options.format, &conversation, &messages, &display_names)?;
    tokio::fs::create_dir_all(&options.transcripts_dir).await?;
    let path = options
        .transcripts_dir
        .join(format!("conversation-{conversation_id}.{}", options.format.extension()));
    tokio::fs::write(&path, rendered).await?;
    Ok(())
}

fn stream_turn(state: AppState, request: TurnRequest) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel::<TurnEvent>(100);

    tokio::spawn(async move {
        // `run_turn_with_autosave` resolves the conversation id itself, so auto-save can be
        // wired in up front here and still land before the `done` event it gates (§4.8 step 6).
        let conversation_id = request.conversation_id.clone();
        let autosave = match &conversation_id {
            Some(id) => state.autosave_options(id).await,
            None => None,
        };
        if let Err(e) = state.orchestrator.run_turn_with_autosave(request, Some(tx), autosave).await {
            tracing::error!(error = %e, "turn failed");
        }
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Ok(Event::default().data(serde_json::to_string(&event).unwrap_or_default()));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
