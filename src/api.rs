// http surface over trip planning sessions

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::AgentRunner;
use crate::conversation::{ConversationState, Stage};
use crate::error::PlannerError;
use crate::models::{Message, SessionMode, TripParameters};
use crate::session::{PlanOutcome, TripForm, TripPlanner, TurnOutcome};
use crate::weather::{WeatherBriefing, WeatherProvider};

struct SessionEntry {
    conversation: Arc<Mutex<ConversationState>>,
    last_active: Instant,
}

type Sessions = RwLock<HashMap<Uuid, SessionEntry>>;

pub struct AppState<W, A> {
    pub planner: Arc<TripPlanner<W, A>>,
    sessions: Arc<Sessions>,
    idle_timeout: Duration,
}

impl<W, A> Clone for AppState<W, A> {
    fn clone(&self) -> Self {
        Self {
            planner: Arc::clone(&self.planner),
            sessions: Arc::clone(&self.sessions),
            idle_timeout: self.idle_timeout,
        }
    }
}

impl<W, A> AppState<W, A> {
    pub fn new(planner: TripPlanner<W, A>, idle_timeout: Duration) -> Self {
        Self {
            planner: Arc::new(planner),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    // every lookup counts as activity
    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<ConversationState>>, ApiError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id).ok_or(ApiError::SessionNotFound(id))?;
        entry.last_active = Instant::now();
        Ok(Arc::clone(&entry.conversation))
    }

    // drop sessions idle for longer than the timeout, returns how many went
    pub async fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let idle = now.saturating_duration_since(entry.last_active);
            let keep = idle < self.idle_timeout;
            if !keep {
                info!(session_id = %id, "Session expired after {}s idle", idle.as_secs());
            }
            keep
        });
        before - sessions.len()
    }
}

// periodic sweep of idle sessions
pub fn spawn_session_sweeper<W, A>(state: AppState<W, A>)
where
    W: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    let period = (state.idle_timeout / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(Instant::now()).await;
            if evicted > 0 {
                debug!("Swept {} idle sessions", evicted);
            }
        }
    });
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("a previous message is still being processed")]
    Busy,

    #[error(transparent)]
    Planner(#[from] PlannerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::Planner(
                PlannerError::MissingDestination
                | PlannerError::EmptyMessage
                | PlannerError::InvalidForm(_),
            ) => StatusCode::BAD_REQUEST,
            ApiError::Planner(PlannerError::ExtractionParse(_) | PlannerError::Agent(_)) => {
                StatusCode::BAD_GATEWAY
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub stage: Stage,
    pub mode: Option<SessionMode>,
    pub parameters: Option<TripParameters>,
    pub briefing: Option<WeatherBriefing>,
    pub pending: Vec<Message>,
}

impl From<&ConversationState> for SessionSummary {
    fn from(conversation: &ConversationState) -> Self {
        Self {
            stage: conversation.stage(),
            mode: conversation.mode(),
            parameters: conversation.parameters().cloned(),
            briefing: conversation.briefing().cloned(),
            pending: conversation.pending_log().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatTurn {
    pub text: String,
}

// setup http routes
pub fn build_router<W, A>(state: AppState<W, A>) -> Router
where
    W: WeatherProvider + 'static,
    A: AgentRunner + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session::<W, A>))
        .route(
            "/sessions/{id}",
            get(session_summary::<W, A>).delete(end_session::<W, A>),
        )
        .route("/sessions/{id}/plan", post(submit_plan::<W, A>))
        .route("/sessions/{id}/chat", post(submit_chat::<W, A>))
        .route("/sessions/{id}/messages", get(confirmed_messages::<W, A>))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn create_session<W, A>(State(st): State<AppState<W, A>>) -> Json<SessionCreated>
where
    W: WeatherProvider,
    A: AgentRunner,
{
    let session_id = Uuid::new_v4();
    let conversation = st.planner.new_session();
    let messages = conversation.pending_log().to_vec();
    st.sessions.write().await.insert(
        session_id,
        SessionEntry {
            conversation: Arc::new(Mutex::new(conversation)),
            last_active: Instant::now(),
        },
    );
    info!(%session_id, "Session started");

    Json(SessionCreated {
        session_id,
        messages,
    })
}

async fn session_summary<W, A>(
    State(st): State<AppState<W, A>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, ApiError> {
    let session = st.session(id).await?;
    let conversation = session.lock().await;
    Ok(Json(SessionSummary::from(&*conversation)))
}

async fn end_session<W, A>(
    State(st): State<AppState<W, A>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    match st.sessions.write().await.remove(&id) {
        Some(_) => {
            info!(session_id = %id, "Session ended");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::SessionNotFound(id)),
    }
}

async fn submit_plan<W, A>(
    State(st): State<AppState<W, A>>,
    Path(id): Path<Uuid>,
    Json(form): Json<TripForm>,
) -> Result<Json<PlanOutcome>, ApiError>
where
    W: WeatherProvider,
    A: AgentRunner,
{
    let session = st.session(id).await?;
    let mut conversation = session.try_lock().map_err(|_| ApiError::Busy)?;
    info!(session_id = %id, "Received trip form for {}", form.destination);

    let outcome = st.planner.submit_form(&mut conversation, form).await.map_err(|e| {
        warn!(session_id = %id, "Trip form failed: {}", e);
        e
    })?;
    Ok(Json(outcome))
}

async fn submit_chat<W, A>(
    State(st): State<AppState<W, A>>,
    Path(id): Path<Uuid>,
    Json(turn): Json<ChatTurn>,
) -> Result<Json<TurnOutcome>, ApiError>
where
    W: WeatherProvider,
    A: AgentRunner,
{
    let session = st.session(id).await?;
    let mut conversation = session.try_lock().map_err(|_| ApiError::Busy)?;
    info!(session_id = %id, "Received chat turn, {} chars", turn.text.len());

    let outcome = st
        .planner
        .submit_chat_turn(&mut conversation, &turn.text)
        .await
        .map_err(|e| {
            warn!(session_id = %id, "Chat turn failed: {}", e);
            e
        })?;
    Ok(Json(outcome))
}

async fn confirmed_messages<W, A>(
    State(st): State<AppState<W, A>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let session = st.session(id).await?;
    let conversation = session.lock().await;
    Ok(Json(conversation.confirmed_log().to_vec()))
}
