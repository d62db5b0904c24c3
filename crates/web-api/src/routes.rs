use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    ApplicationError, ConversationDetail, ConversationSummary, CreateReplyRequest,
    CreateThreadRequest, MessagePage, PageRequest,
};
use domain::{ConversationId, Reply, Thread, ThreadId, UserId};

use crate::{
    auth::bearer_token, error::ApiError, state::AppState, ws_connection::WebSocketConnection,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_upgrade))
        .route("/chats", get(list_conversations))
        .route("/chats/with/{user_id}", post(open_conversation))
        .route("/chats/{conversation_id}", delete(delete_conversation))
        .route("/chats/{conversation_id}/messages", get(list_messages))
        .route("/chats/{conversation_id}/read", post(mark_conversation_read))
        .route("/forum/threads", post(create_thread))
        .route("/forum/threads/{thread_id}/replies", post(create_reply))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn caller(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    state.jwt_service.extract_user_from_headers(headers)
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let me = caller(&state, &headers)?;
    let items = state.services.conversations.list_for_user(me).await?;
    Ok(Json(items))
}

async fn open_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ConversationDetail>, ApiError> {
    let me = caller(&state, &headers)?;
    let detail = state
        .services
        .conversations
        .open(me, UserId::from(user_id))
        .await?;
    Ok(Json(detail))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(page): Query<PageRequest>,
    headers: HeaderMap,
) -> Result<Json<MessagePage>, ApiError> {
    let me = caller(&state, &headers)?;
    let page = state
        .services
        .conversations
        .messages(me, ConversationId::from(conversation_id), page)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadResponse {
    marked_count: u64,
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let me = caller(&state, &headers)?;
    let marked_count = state
        .services
        .receipts
        .mark_conversation_read(me, ConversationId::from(conversation_id))
        .await?;
    Ok(Json(MarkReadResponse { marked_count }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let me = caller(&state, &headers)?;
    state
        .services
        .conversations
        .delete(me, ConversationId::from(conversation_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<Thread>), ApiError> {
    caller(&state, &headers)?;
    let thread = state.services.forum.create_thread(payload).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

async fn create_reply(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<CreateReplyRequest>,
) -> Result<(StatusCode, Json<Reply>), ApiError> {
    caller(&state, &headers)?;
    let reply = state
        .services
        .forum
        .create_reply(ThreadId::from(thread_id), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 升级前完成认证，失败直接返回 401，不分配任何连接资源
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("Authentication error"))?;

    let user = state
        .services
        .lifecycle
        .authenticate(token)
        .await
        .map_err(|err| match err {
            ApplicationError::Authentication => {
                tracing::debug!("WebSocket 握手被拒绝");
                ApiError::unauthorized("Authentication error")
            }
            other => ApiError::from(other),
        })?;

    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, state, user).run()))
}
