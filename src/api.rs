use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, patch, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::accounts::{
    self, password, session::token_from_headers, Claims, MemoryUserStore, NewUser, SessionKeys,
    User, UserStore,
};
use crate::arena::{DebateClient, DebateRequest, DebateTurn, StreamConsumer, Termination};
use crate::assistant::{AssistantClient, ChatReply, ChatRequest, ModelRoster};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::news::{cache::NewsCache, source::FeedSource, source::HttpFeed, NewsItem};
use crate::telemetry::anon_id;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub news: Option<Arc<dyn FeedSource>>,
    pub news_cache: Arc<NewsCache>,
    pub assistant: AssistantClient,
    pub debate: DebateClient,
    pub users: Arc<dyn UserStore>,
    pub sessions: SessionKeys,
}

impl AppState {
    /// Build state from config: HTTP feed (if configured), inference clients and
    /// an in-memory user store.
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let news: Option<Arc<dyn FeedSource>> = match &config.news_api_url {
            Some(url) => Some(Arc::new(HttpFeed::from_url(url.clone())?)),
            None => None,
        };
        let assistant =
            AssistantClient::from_base_url(config.inference_base_url.clone(), config.chat_timeout())?;
        let debate = DebateClient::from_base_url(config.inference_base_url.clone())?;
        let secret = config.resolve_jwt_secret()?;
        let sessions = SessionKeys::new(&secret, config.session_ttl(), config.secure_cookies);

        Ok(Self {
            news,
            news_cache: Arc::new(NewsCache::new(config.news_cache_ttl())),
            assistant,
            debate,
            users: Arc::new(MemoryUserStore::new()),
            sessions,
            config: Arc::new(config),
        })
    }

    pub fn with_news_source(mut self, source: Arc<dyn FeedSource>) -> Self {
        self.news = Some(source);
        self.news_cache.invalidate();
        self
    }

    pub fn without_news_source(mut self) -> Self {
        self.news = None;
        self
    }

    pub fn with_user_store(mut self, users: Arc<dyn UserStore>) -> Self {
        self.users = users;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/news", get(news))
        .route("/api/models", get(models))
        .route("/api/chat", post(chat))
        .route("/api/arena/debate", post(arena_debate))
        .route("/api/arena/debate-stream", post(arena_debate_stream))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/profile", patch(update_profile))
        .route("/api/auth/delete", delete(delete_account))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct NewsResponse {
    items: Vec<NewsItem>,
}

async fn news(State(state): State<AppState>) -> AppResult<Json<NewsResponse>> {
    let source = state
        .news
        .as_ref()
        .ok_or(AppError::NotConfigured("NEWS_API_URL"))?;
    let items = state.news_cache.get_or_fetch(source.as_ref()).await?;
    Ok(Json(NewsResponse {
        items: items.as_ref().clone(),
    }))
}

// ---------------------------------------------------------------------------
// Chat + arena
// ---------------------------------------------------------------------------

async fn models(State(state): State<AppState>) -> AppResult<Json<ModelRoster>> {
    Ok(Json(state.assistant.models().await?))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    if let Some(last) = req.messages.last() {
        tracing::info!(
            target: "chat",
            id = %anon_id(&last.content),
            turns = req.messages.len(),
            model = req.model.as_deref().unwrap_or("default"),
            "chat request"
        );
    }
    Ok(Json(state.assistant.chat(&req).await?))
}

#[derive(Serialize)]
struct DebateResponse {
    turns: Vec<DebateTurn>,
    doctor: Vec<DebateTurn>,
    resident: Vec<DebateTurn>,
    patient: Vec<DebateTurn>,
    termination: Termination,
    malformed_frames: u64,
    error_frames: u64,
}

async fn start_debate(state: &AppState, req: &DebateRequest) -> AppResult<StreamConsumer> {
    if req.symptoms.trim().is_empty() {
        return Err(AppError::BadRequest("symptoms must not be empty".into()));
    }
    tracing::info!(
        target: "arena",
        id = %anon_id(&req.symptoms),
        model = %req.model,
        max_rounds = req.max_rounds,
        "debate started"
    );
    state.debate.start(req).await
}

async fn arena_debate(
    State(state): State<AppState>,
    Json(req): Json<DebateRequest>,
) -> AppResult<Json<DebateResponse>> {
    let consumer = start_debate(&state, &req).await?;
    let outcome = consumer
        .run_until(tokio::time::sleep(state.config.debate_timeout()))
        .await;

    let columns = outcome.columns();
    Ok(Json(DebateResponse {
        doctor: columns.doctor,
        resident: columns.resident,
        patient: columns.patient,
        termination: outcome.termination,
        malformed_frames: outcome.malformed_frames,
        error_frames: outcome.error_frames,
        turns: outcome.transcript.into_turns(),
    }))
}

/// A debate being relayed to the browser as it happens.
struct LiveDebate {
    consumer: StreamConsumer,
    deadline: Pin<Box<tokio::time::Sleep>>,
}

impl LiveDebate {
    fn termination_event(&self) -> Result<Event, axum::Error> {
        Event::default().event("termination").json_data(json!({
            "termination": self.consumer.termination().cloned().unwrap_or(Termination::Cancelled),
            "turns": self.consumer.transcript().len(),
            "malformed_frames": self.consumer.malformed_frames(),
            "error_frames": self.consumer.error_frames(),
        }))
    }
}

/// Same debate as `arena_debate`, but every turn is sent as a `turn` event the
/// moment it arrives, followed by one `termination` event.
async fn arena_debate_stream(
    State(state): State<AppState>,
    Json(req): Json<DebateRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let consumer = start_debate(&state, &req).await?;
    let live = LiveDebate {
        consumer,
        deadline: Box::pin(tokio::time::sleep(state.config.debate_timeout())),
    };

    let events = stream::unfold(Some(live), |live| async move {
        let mut live = live?;
        let turn = tokio::select! {
            biased;
            _ = &mut live.deadline => {
                live.consumer.cancel();
                None
            }
            turn = live.consumer.next_turn() => turn,
        };
        match turn {
            Some(turn) => Some((Event::default().event("turn").json_data(&turn), Some(live))),
            None => Some((live.termination_event(), None)),
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Caller identity taken from a valid session cookie.
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        state.sessions.verify(&token).map(AuthUser)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserView {
    id: String,
    name: String,
    email: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&User> for UserView {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            created_at: u.created_at,
        }
    }
}

#[derive(Deserialize)]
struct SignupReq {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct LoginReq {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct ProfileReq {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

async fn hash_off_thread(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("hashing task")))?
        .map_err(AppError::Internal)
}

async fn signup(State(state): State<AppState>, Json(req): Json<SignupReq>) -> AppResult<Response> {
    let (name, email) = accounts::validate_signup(&req.name, &req.email, &req.password)?;
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("User with this email already exists".into()));
    }

    let password_hash = hash_off_thread(req.password).await?;
    let user = state
        .users
        .insert(NewUser {
            name,
            email,
            password_hash,
        })
        .await?;
    let token = state.sessions.issue(&user)?;
    tracing::info!(target: "accounts", id = %anon_id(&user.id), "user signed up");

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, state.sessions.session_cookie(token))],
        Json(json!({
            "message": "User created successfully",
            "user": UserView::from(&user),
        })),
    )
        .into_response())
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginReq>) -> AppResult<Response> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".into()));
    }
    let email = accounts::normalize_email(&req.email);
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let stored = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || password::verify_password(&req.password, &stored))
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("verify task")))?;
    if !ok {
        tracing::info!(target: "accounts", id = %anon_id(&user.id), "login rejected");
        return Err(AppError::Unauthorized);
    }

    let token = state.sessions.issue(&user)?;
    Ok((
        [(header::SET_COOKIE, state.sessions.session_cookie(token))],
        Json(json!({
            "message": "Login successful",
            "user": UserView::from(&user),
        })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>) -> Response {
    (
        [(header::SET_COOKIE, state.sessions.cleared_cookie())],
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response()
}

async fn me(State(state): State<AppState>, AuthUser(claims): AuthUser) -> AppResult<Json<UserView>> {
    let user = state
        .users
        .find_by_id(&claims.sub)
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(UserView::from(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<ProfileReq>,
) -> AppResult<Json<serde_json::Value>> {
    let (name, email) = accounts::validate_profile(&req.name, &req.email)?;
    let user = state.users.update_profile(&claims.sub, &name, &email).await?;
    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": { "name": user.name, "email": user.email },
    })))
}

async fn delete_account(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> AppResult<Response> {
    if !state.users.delete(&claims.sub).await? {
        return Err(AppError::NotFound("User"));
    }
    tracing::info!(target: "accounts", id = %anon_id(&claims.sub), "account deleted");
    Ok((
        [(header::SET_COOKIE, state.sessions.cleared_cookie())],
        Json(json!({ "message": "Account deleted successfully" })),
    )
        .into_response())
}
