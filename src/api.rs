//! HTTP routes.
//!
//! Turns are streamed as server-sent events, one JSON [`StreamUnit`] per
//! `data:` line. Everything else is plain JSON.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::abuse::{self, AbuseConfig};
use crate::auth::{self, AdminConfig, AuthPlayer, MaybePlayer};
use crate::error::GameResult;
use crate::state::export::StateExport;
use crate::state::turn::DemoReply;
use crate::state::{AppState, TopicSummary, TurnRequest};
use crate::types::*;

type EventStream = BoxStream<'static, Result<Event, axum::Error>>;
type TurnEvents = Sse<KeepAliveStream<EventStream>>;

/// All API routes, without static file serving
pub fn router(state: Arc<AppState>, abuse: Arc<AbuseConfig>, admin: Arc<AdminConfig>) -> Router {
    let generation_routes = Router::new()
        .route("/api/chat-stream", post(chat_stream))
        .route("/api/chat-stream/{topic}", post(chat_stream_topic))
        .route("/api/chat-demo", post(chat_demo))
        .route_layer(middleware::from_fn_with_state(
            abuse,
            abuse::turn_rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
        .route_layer(middleware::from_fn_with_state(
            admin,
            auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/user", get(current_user))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{id}", get(conversation_detail))
        .route("/api/conversations/{id}/reset-round", post(reset_round))
        .route("/api/messages/{id}", put(edit_message))
        .route("/api/topics", get(list_topics))
        .route("/api/topics/{topic}/random-subject", get(random_subject))
        .route("/api/upload-terms", post(upload_terms))
        .merge(generation_routes)
        .merge(admin_routes)
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub player_id: PlayerId,
    pub token: String,
    pub display_name: String,
}

/// POST /api/auth/register
async fn register(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RegisterRequest>>,
) -> GameResult<impl IntoResponse> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let player = state.register_player(body.display_name).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            player_id: player.id,
            token: player.token,
            display_name: player.display_name,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: PlayerId,
    pub display_name: String,
    #[serde(flatten)]
    pub profile: PlayerProfile,
}

/// GET /api/auth/user
async fn current_user(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
) -> Json<UserInfo> {
    let profile = state.get_profile(&player.id).await;
    Json(UserInfo {
        id: player.id,
        display_name: player.display_name,
        profile,
    })
}

async fn stream_turn(
    state: &Arc<AppState>,
    player: &Player,
    request: TurnRequest,
) -> GameResult<TurnEvents> {
    let handle = state.start_turn(player, request).await?;
    let events = handle
        .units
        .map(|unit| Event::default().json_data(unit))
        .boxed();
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// POST /api/chat-stream
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Json(request): Json<TurnRequest>,
) -> GameResult<TurnEvents> {
    stream_turn(&state, &player, request).await
}

/// POST /api/chat-stream/{topic}
async fn chat_stream_topic(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Path(topic): Path<String>,
    Json(mut request): Json<TurnRequest>,
) -> GameResult<TurnEvents> {
    request.topic = Some(topic);
    stream_turn(&state, &player, request).await
}

#[derive(Debug, Deserialize)]
pub struct DemoRequest {
    pub prompt: String,
}

/// POST /api/chat-demo
async fn chat_demo(
    State(state): State<Arc<AppState>>,
    MaybePlayer(player): MaybePlayer,
    Json(request): Json<DemoRequest>,
) -> GameResult<Json<DemoReply>> {
    let reply = state.chat_demo(player.as_ref(), &request.prompt).await?;
    Ok(Json(reply))
}

/// GET /api/conversations
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
) -> Json<Vec<Conversation>> {
    Json(state.list_conversations(&player.id).await)
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// GET /api/conversations/{id}
async fn conversation_detail(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Path(id): Path<ConversationId>,
) -> GameResult<Json<ConversationDetail>> {
    let conversation = state.get_conversation(&player.id, &id).await?;
    let messages = state.get_messages(&player.id, &id).await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

/// POST /api/conversations/{id}/reset-round
async fn reset_round(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Path(id): Path<ConversationId>,
) -> GameResult<Json<Conversation>> {
    Ok(Json(state.reset_round(&player.id, &id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub content: String,
}

/// PUT /api/messages/{id}
async fn edit_message(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Path(id): Path<MessageId>,
    Json(request): Json<EditRequest>,
) -> GameResult<Json<Message>> {
    Ok(Json(
        state.edit_message(&player.id, &id, request.content).await?,
    ))
}

/// GET /api/topics
async fn list_topics(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
) -> Json<Vec<TopicSummary>> {
    Json(state.list_topics(&player.id).await)
}

#[derive(Debug, Deserialize)]
pub struct UploadTermsRequest {
    pub name: String,
    pub terms: Vec<String>,
}

/// POST /api/upload-terms
async fn upload_terms(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Json(request): Json<UploadTermsRequest>,
) -> GameResult<Json<Topic>> {
    Ok(Json(
        state
            .upload_terms(&player, &request.name, request.terms)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct RandomSubject {
    pub topic: String,
    pub subject: String,
}

/// GET /api/topics/{topic}/random-subject
async fn random_subject(
    State(state): State<Arc<AppState>>,
    AuthPlayer(player): AuthPlayer,
    Path(topic): Path<String>,
) -> Json<RandomSubject> {
    let subject = state.random_subject(&player.id, &topic).await;
    Json(RandomSubject { topic, subject })
}

/// GET /api/state/export
async fn export_state(State(state): State<Arc<AppState>>) -> Json<StateExport> {
    Json(state.export_state().await)
}

/// POST /api/state/import
///
/// Replaces all persisted records with the snapshot.
async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<StateExport>,
) -> GameResult<impl IntoResponse> {
    state.import_state(export).await?;
    Ok((StatusCode::OK, "State imported successfully"))
}
