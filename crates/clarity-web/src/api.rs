//! REST API endpoint handlers.
//!
//! Every session-scoped request is one render cycle: take the session's lock,
//! apply the action, build the view. The per-session lock is held across the
//! model call, so one session processes one cycle at a time while other
//! sessions proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clarity_rs::assistant::{AssistantError, AuditAssistant, FinanceAssistant};
use clarity_rs::config::ClarityConfig;
use clarity_rs::prompt::FinanceContext;
use clarity_rs::resolver::{ResolveError, Resolver};
use clarity_rs::session::{MODULE_OPTIONS, ModuleOption, Refinement, Session, generate_session_id};
use clarity_rs::{AzureChatClient, ChatError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::snapshot::{AuditView, FinanceView};

type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

struct SessionEntry {
    handle: SessionHandle,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            handle: SessionHandle::default(),
            last_seen: Instant::now(),
        }
    }

    /// Idle past `ttl` and not held by an in-flight request.
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() >= ttl && Arc::strong_count(&self.handle) == 1
    }
}

type SessionMap = HashMap<String, SessionEntry>;

/// Drop expired sessions, returning how many were removed.
fn sweep_expired(sessions: &mut SessionMap, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| !entry.is_expired(ttl));
    before - sessions.len()
}

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<SessionMap>>,
    session_ttl: Duration,
    pub client: Arc<AzureChatClient>,
    pub resolver: Arc<Resolver>,
}

impl AppState {
    pub fn new(config: &ClarityConfig, session_ttl: Duration) -> Result<Self, ChatError> {
        Ok(Self {
            sessions: Arc::default(),
            session_ttl,
            client: Arc::new(AzureChatClient::new(config)?),
            resolver: Arc::new(Resolver::new(&config.modules_dir, &config.prompts_dir)),
        })
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live session and mark it as used.
    fn session(&self, id: &str) -> Result<SessionHandle, ApiError> {
        let mut sessions = self.lock_sessions();
        if sessions
            .get(id)
            .is_some_and(|entry| entry.is_expired(self.session_ttl))
        {
            sessions.remove(id);
            debug!("Session {id} expired");
        }
        let entry = sessions.get_mut(id).ok_or_else(|| unknown_session(id))?;
        entry.last_seen = Instant::now();
        Ok(entry.handle.clone())
    }
}

fn unknown_session(id: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, format!("unknown session '{id}'"))
}

// ── Errors ─────────────────────────────────────────────────────────

/// Error response body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        let status = match err {
            ResolveError::Io { .. } | ResolveError::Parse { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Audit resolution failures become error responses; everything else is
/// shown inline in the view.
fn split_error(err: AssistantError) -> Result<String, ApiError> {
    match err {
        AssistantError::Resolve(e) => Err(e.into()),
        other => Ok(other.to_string()),
    }
}

// ── Sessions and catalog ───────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
}

/// POST /api/sessions: Create an empty session. Idle sessions are swept
/// first.
pub async fn create_session(State(app): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let session_id = generate_session_id();
    let mut sessions = app.lock_sessions();
    let expired = sweep_expired(&mut sessions, app.session_ttl);
    if expired > 0 {
        info!("Dropped {expired} idle sessions");
    }
    sessions.insert(session_id.clone(), SessionEntry::new());
    info!("Created session {session_id} ({} live)", sessions.len());
    (StatusCode::CREATED, Json(CreatedSession { session_id }))
}

/// DELETE /api/sessions/{id}: Discard a session.
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app.lock_sessions()
        .remove(&id)
        .ok_or_else(|| unknown_session(&id))?;
    info!("Deleted session {id}");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/modules: Audit module catalog in picker order.
pub async fn list_modules() -> Json<&'static [ModuleOption]> {
    let options: &'static [ModuleOption] = &MODULE_OPTIONS;
    Json(options)
}

// ── Audit ──────────────────────────────────────────────────────────

/// Actions accepted by POST /api/sessions/{id}/audit.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    /// Review the stored note with the selected module.
    Run,
    /// Fill the note with the module's sample.
    Demo,
    /// Clear note and result.
    Reset,
    SelectModule { label: String },
    SetNote { note: String },
}

/// GET /api/sessions/{id}/audit: Current audit view.
pub async fn get_audit(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuditView>, ApiError> {
    let handle = app.session(&id)?;
    let session = handle.lock().await;
    Ok(Json(AuditView::render(&session.audit, &app.resolver, None)?))
}

/// POST /api/sessions/{id}/audit: Apply one audit action.
///
/// Remote-call failures come back as 200 with `error` set and the session
/// unchanged. A missing module is a 404.
pub async fn post_audit(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(action): Json<AuditAction>,
) -> Result<Json<AuditView>, ApiError> {
    let handle = app.session(&id)?;
    let mut session = handle.lock().await;
    let audit = &mut session.audit;
    debug!("Session {id}: audit action {action:?}");

    let mut error = None;
    match action {
        AuditAction::Run => {
            if let Err(e) = AuditAssistant::new(&app.client, &app.resolver)
                .run(audit)
                .await
            {
                error = Some(split_error(e)?);
            }
        }
        AuditAction::Demo => {
            let record = app.resolver.load_module(audit.selected_module_id)?;
            audit.apply_demo(&record);
        }
        AuditAction::Reset => audit.reset(),
        AuditAction::SelectModule { label } => {
            audit
                .select_module(&label)
                .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
        }
        AuditAction::SetNote { note } => audit.set_note(note),
    }

    Ok(Json(AuditView::render(audit, &app.resolver, error)?))
}

// ── Finance ────────────────────────────────────────────────────────

/// Query parameters for the finance view.
#[derive(Debug, Default, Deserialize)]
pub struct FinanceQuery {
    /// Include the stored plan as pretty JSON.
    #[serde(default)]
    pub raw: bool,
}

/// Actions accepted by POST /api/sessions/{id}/finance.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FinanceAction {
    /// Request a plan for the stored note and context.
    Run,
    /// Fill the note with the demo text.
    Demo,
    /// Clear every finance slot.
    Reset,
    SetNote {
        note: String,
    },
    SetContext {
        #[serde(default)]
        context: FinanceContext,
    },
    /// Stage numbers for the next render cycle.
    SaveRefinement {
        refinement: Refinement,
    },
}

/// GET /api/sessions/{id}/finance: Current finance view.
pub async fn get_finance(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FinanceQuery>,
) -> Result<Json<FinanceView>, ApiError> {
    let handle = app.session(&id)?;
    let mut session = handle.lock().await;
    Ok(Json(FinanceView::render(&mut session.finance, query.raw, None)))
}

/// POST /api/sessions/{id}/finance: Apply one finance action.
///
/// A refinement staged by the previous request is applied before the action
/// reads any context. Every run failure, including a missing prompt fragment,
/// comes back as 200 with `error` set and the session unchanged.
pub async fn post_finance(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FinanceQuery>,
    Json(action): Json<FinanceAction>,
) -> Result<Json<FinanceView>, ApiError> {
    let handle = app.session(&id)?;
    let mut session = handle.lock().await;
    let finance = &mut session.finance;
    finance.apply_pending();
    debug!("Session {id}: finance action {action:?}");

    let mut error = None;
    match action {
        FinanceAction::Run => {
            // Missing prompt fragments are shown inline like remote failures,
            // so the stored plan and context stay on screen.
            if let Err(e) = FinanceAssistant::new(&app.client, &app.resolver)
                .run(finance)
                .await
            {
                error = Some(e.to_string());
            }
        }
        FinanceAction::Demo => finance.apply_demo(),
        FinanceAction::Reset => finance.reset(),
        FinanceAction::SetNote { note } => finance.set_note(note),
        FinanceAction::SetContext { context } => finance.set_context(context),
        FinanceAction::SaveRefinement { refinement } => finance.stage_refinement(refinement),
    }

    Ok(Json(FinanceView::render(finance, query.raw, error)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_actions_deserialize() {
        let run: AuditAction = serde_json::from_str(r#"{"action":"run"}"#).unwrap();
        assert!(matches!(run, AuditAction::Run));

        let select: AuditAction =
            serde_json::from_str(r#"{"action":"select_module","label":"Donated Services"}"#)
                .unwrap();
        assert!(matches!(select, AuditAction::SelectModule { label } if label == "Donated Services"));

        assert!(serde_json::from_str::<AuditAction>(r#"{"action":"publish"}"#).is_err());
    }

    #[test]
    fn finance_actions_deserialize() {
        let ctx: FinanceAction = serde_json::from_str(
            r#"{"action":"set_context","context":{"income":"5200","debts":"Card A $3.2k"}}"#,
        )
        .unwrap();
        match ctx {
            FinanceAction::SetContext { context } => {
                assert_eq!(context.income, "5200");
                assert_eq!(context.debts, "Card A $3.2k");
                assert!(context.goals.is_empty());
            }
            other => panic!("unexpected action {other:?}"),
        }

        let refine: FinanceAction = serde_json::from_str(
            r#"{"action":"save_refinement","refinement":{"income":"5200","expenses":3100.5}}"#,
        )
        .unwrap();
        match refine {
            FinanceAction::SaveRefinement { refinement } => {
                assert_eq!(refinement.expenses, Some(3100.5));
                assert!(refinement.goals.is_none());
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn sweep_keeps_fresh_and_in_flight_sessions() {
        let mut sessions = SessionMap::new();
        sessions.insert("ss-idle".into(), SessionEntry::new());
        sessions.insert("ss-busy".into(), SessionEntry::new());
        let held = sessions["ss-busy"].handle.clone();

        assert_eq!(sweep_expired(&mut sessions, Duration::from_secs(60)), 0);
        assert_eq!(sweep_expired(&mut sessions, Duration::ZERO), 1);
        assert!(sessions.contains_key("ss-busy"));

        drop(held);
        assert_eq!(sweep_expired(&mut sessions, Duration::ZERO), 1);
        assert!(sessions.is_empty());
    }

    #[test]
    fn audit_errors_split_into_status_and_inline() {
        let err = AssistantError::from(ResolveError::EmptyIdentifier);
        assert_eq!(split_error(err).unwrap_err().status, StatusCode::NOT_FOUND);

        let err = AssistantError::from(clarity_rs::prompt::TemplateError::UnknownPlaceholder {
            name: "savings".into(),
        });
        assert!(split_error(err).unwrap().contains("savings"));
    }

    #[test]
    fn resolve_errors_map_to_status() {
        let not_found = ApiError::from(ResolveError::NotFound {
            identifier: "9".into(),
            tried: vec![],
        });
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let io = ApiError::from(ResolveError::Io {
            path: "modules/module1.yaml".into(),
            source: std::io::Error::other("denied"),
        });
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
