//! Endpoint handlers. Everything here runs after admission.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Serialize;

use crate::clock::Clock;
use crate::http::server::AppState;
use crate::notes::{NewNote, Note};
use crate::observability::metrics;
use crate::security::{Claims, IssueError, ValidatedPayload};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub instance: String,
    /// Milliseconds since the Unix epoch.
    pub ts: u64,
}

#[derive(Serialize)]
pub struct WhoAmI {
    pub instance: String,
    pub pid: u32,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Serialize)]
pub struct NoteList {
    pub instance: String,
    pub notes: Vec<Note>,
}

#[derive(Serialize)]
pub struct CreatedRef {
    pub id: u64,
}

#[derive(Serialize)]
pub struct NoteCreated {
    pub created: CreatedRef,
    pub instance: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        instance: state.instance.to_string(),
        ts: state.clock.now_ms(),
    })
}

pub async fn whoami(State(state): State<AppState>) -> Json<WhoAmI> {
    Json(WhoAmI {
        instance: state.instance.to_string(),
        pid: std::process::id(),
    })
}

/// Demo login: no credential check, fixed subject and role.
pub async fn login(State(state): State<AppState>) -> Result<Json<LoginResponse>, IssueError> {
    let login = &state.login;
    let issued = state.tokens.issue(&login.subject, &login.role, login.ttl)?;
    Ok(Json(LoginResponse { token: issued.token }))
}

pub async fn list_notes(State(state): State<AppState>) -> Json<NoteList> {
    Json(NoteList {
        instance: state.instance.to_string(),
        notes: state.notes.list(),
    })
}

pub async fn create_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Extension(mut payload): Extension<ValidatedPayload>,
) -> impl IntoResponse {
    let note = state.notes.insert(NewNote {
        title: payload.take("title").unwrap_or_default(),
        body: payload.take("body").unwrap_or_default(),
        by: claims.sub,
    });
    metrics::record_note_count(state.notes.len());
    tracing::info!(id = note.id, by = %note.by, "Note created");

    (
        StatusCode::CREATED,
        Json(NoteCreated {
            created: CreatedRef { id: note.id },
            instance: state.instance.to_string(),
        }),
    )
}
