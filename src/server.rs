//! JSON HTTP API server.
//!
//! Every user-facing action is an endpoint here. Handlers resolve the
//! caller's identity from the `Authorization: Bearer` header, call into the
//! store/pipeline layer, and translate [`ActionError`] kinds into HTTP
//! statuses.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Chat not found" } }
//! ```
//!
//! Codes: `unauthorized` (401), `not_found` (404), `validation_error` (400),
//! `collaborator_failure` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{self, RagAnswer};
use crate::auth::{self, Identity, Session};
use crate::chats;
use crate::completion::{create_completer, ChatMessage, ChatRole, Completer, MessageContent};
use crate::config::{ChunkingConfig, Config};
use crate::converse::{self, SendMessageOutcome};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::landing::{self, GeneratedLandingPage};
use crate::memory::{self, MemoryConversation, MemoryExchange, MemoryMessage};
use crate::messages;
use crate::migrate;
use crate::models::{Chat, Message, Namespace, NEW_CHAT_TITLE};
use crate::namespaces::{self, NamespacePurge};
use crate::ratelimit::RateLimiter;
use crate::result::{ActionError, ErrorKind};
use crate::upload::{self, UploadFile, UploadSummary};
use crate::vector::{create_vector_index, VectorIndex};

/// Shared application state. The pool and collaborator clients are built once
/// at startup and cloned cheaply into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn Completer>,
    pub index: Arc<dyn VectorIndex>,
    pub limiter: RateLimiter,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        embedder: Arc::from(create_embedder(&config.embedding)?),
        completer: Arc::from(create_completer(&config.completion)?),
        index: Arc::from(create_vector_index(&config.vector)?),
        limiter: RateLimiter::new(pool.clone()),
        pool,
    };

    let bind_addr = config.server.bind.clone();
    let app = build_router(state);

    println!("docbox listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the router. Separated from [`run_server`] so tests can drive the
/// app without binding a socket.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route(
            "/namespaces",
            get(handle_list_namespaces).post(handle_create_namespace),
        )
        .route("/namespaces/{id}", delete(handle_delete_namespace))
        .route(
            "/namespaces/{id}/chats",
            get(handle_list_chats).post(handle_create_chat),
        )
        .route("/namespaces/{id}/documents", post(handle_upload_documents))
        .route("/chats/send", post(handle_send_message))
        .route("/chats/{id}", delete(handle_delete_chat))
        .route("/chats/{id}/messages", get(handle_list_messages))
        .route("/ask", post(handle_ask))
        .route("/landing-page", post(handle_landing_page))
        .route(
            "/memory/conversations",
            get(handle_list_conversations).post(handle_create_conversation),
        )
        .route(
            "/memory/conversations/{id}/messages",
            get(handle_conversation_messages),
        )
        .route(
            "/memory/conversations/{id}/send",
            post(handle_memory_send),
        )
        .route(
            "/memory/conversations/{id}",
            delete(handle_delete_conversation),
        )
        .route("/inference/chat", post(handle_inference_chat))
        .route("/inference/multimodal", post(handle_inference_multimodal))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// [`ActionError`] carried across the handler boundary into an HTTP response.
pub struct AppError(ActionError);

impl From<ActionError> for AppError {
    fn from(e: ActionError) -> Self {
        AppError(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Collaborator => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.0.kind == ErrorKind::Collaborator {
            eprintln!("collaborator failure: {}", self.0.message);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.kind.code().to_string(),
                message: self.0.message,
            },
        };
        (status_for(self.0.kind), Json(body)).into_response()
    }
}

async fn identify(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    Ok(auth::resolve_identity(&state.pool, &state.config.auth, authorization).await?)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Auth ============

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    name: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: String,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let id = auth::register(&state.pool, &req.email, &req.password, &req.name).await?;
    Ok(Json(RegisterResponse { id }))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Session>, AppError> {
    let session = auth::login(
        &state.pool,
        &state.limiter,
        &state.config.auth,
        &req.email,
        &req.password,
    )
    .await?;
    Ok(Json(session))
}

// ============ Namespaces ============

#[derive(Serialize)]
struct NamespaceListResponse {
    namespaces: Vec<Namespace>,
}

async fn handle_list_namespaces(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<NamespaceListResponse>, AppError> {
    let identity = identify(&state, &headers).await?;
    let namespaces = namespaces::list_namespaces(&state.pool, &identity).await?;
    Ok(Json(NamespaceListResponse { namespaces }))
}

#[derive(Deserialize)]
struct CreateNamespaceRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn handle_create_namespace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateNamespaceRequest>,
) -> Result<Json<Namespace>, AppError> {
    let identity = identify(&state, &headers).await?;
    let namespace = namespaces::create_namespace(
        &state.pool,
        &identity,
        &req.name,
        req.description.as_deref(),
    )
    .await?;
    Ok(Json(namespace))
}

async fn handle_delete_namespace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<NamespacePurge>, AppError> {
    let identity = identify(&state, &headers).await?;
    let purge =
        namespaces::delete_namespace(&state.pool, state.index.as_ref(), &identity, &id).await?;
    Ok(Json(purge))
}

// ============ Chats ============

#[derive(Serialize)]
struct ChatListResponse {
    chats: Vec<Chat>,
}

async fn handle_list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace_id): Path<String>,
) -> Result<Json<ChatListResponse>, AppError> {
    let identity = identify(&state, &headers).await?;
    let chats = chats::list_chats(&state.pool, &identity, &namespace_id).await?;
    Ok(Json(ChatListResponse { chats }))
}

#[derive(Deserialize)]
struct CreateChatRequest {
    #[serde(default)]
    title: Option<String>,
}

async fn handle_create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace_id): Path<String>,
    Json(req): Json<CreateChatRequest>,
) -> Result<Json<Chat>, AppError> {
    let identity = identify(&state, &headers).await?;
    let title = req.title.as_deref().unwrap_or(NEW_CHAT_TITLE);
    let chat = chats::create_chat(&state.pool, &identity, &namespace_id, title).await?;
    Ok(Json(chat))
}

async fn handle_delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let identity = identify(&state, &headers).await?;
    chats::delete_chat(&state.pool, &identity, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

#[derive(Serialize)]
struct MessageListResponse {
    messages: Vec<Message>,
}

async fn handle_list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<MessageListResponse>, AppError> {
    let identity = identify(&state, &headers).await?;
    let messages = messages::list_messages(&state.pool, &identity, &chat_id).await?;
    Ok(Json(MessageListResponse { messages }))
}

// ============ Send message ============

#[derive(Deserialize)]
struct SendMessageRequest {
    namespace_id: String,
    #[serde(default)]
    chat_id: Option<String>,
    content: String,
}

async fn handle_send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageOutcome>, AppError> {
    let identity = identify(&state, &headers).await?;
    let outcome = converse::send_message(
        &state.pool,
        state.embedder.as_ref(),
        state.index.as_ref(),
        state.completer.as_ref(),
        &state.config.retrieval,
        &identity,
        &req.namespace_id,
        req.chat_id.as_deref(),
        &req.content,
    )
    .await?;
    Ok(Json(outcome))
}

// ============ Document upload ============

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadFilePayload>,
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    overlap_size: Option<usize>,
}

#[derive(Deserialize)]
struct UploadFilePayload {
    filename: String,
    content_type: String,
    data_base64: String,
}

async fn handle_upload_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(namespace_id): Path<String>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadSummary>, AppError> {
    let identity = identify(&state, &headers).await?;
    // ownership gate before anything touches the index
    namespaces::get_namespace(&state.pool, &identity, &namespace_id).await?;

    let mut files = Vec::with_capacity(req.files.len());
    for payload in &req.files {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&payload.data_base64)
            .map_err(|_| {
                ActionError::validation(format!("invalid base64 in file {}", payload.filename))
            })?;
        files.push(UploadFile {
            filename: payload.filename.clone(),
            content_type: payload.content_type.clone(),
            bytes,
        });
    }

    let chunking = ChunkingConfig {
        chunk_size: req.chunk_size.unwrap_or(state.config.chunking.chunk_size),
        overlap_size: req
            .overlap_size
            .unwrap_or(state.config.chunking.overlap_size),
    };

    let summary = upload::process_documents(
        state.embedder.as_ref(),
        state.index.as_ref(),
        &chunking,
        &namespace_id,
        &files,
    )
    .await?;
    Ok(Json(summary))
}

// ============ Ask (stateless RAG) ============

#[derive(Deserialize)]
struct HistoryItem {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AskRequest {
    namespace_id: String,
    query: String,
    #[serde(default)]
    history: Vec<HistoryItem>,
}

fn history_to_messages(history: &[HistoryItem]) -> Result<Vec<ChatMessage>, ActionError> {
    history
        .iter()
        .map(|item| match item.role.as_str() {
            "user" => Ok(ChatMessage::user(&item.content)),
            "assistant" => Ok(ChatMessage::assistant(&item.content)),
            other => Err(ActionError::validation(format!(
                "invalid history role: {}",
                other
            ))),
        })
        .collect()
}

async fn handle_ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<Json<RagAnswer>, AppError> {
    let identity = identify(&state, &headers).await?;
    namespaces::get_namespace(&state.pool, &identity, &req.namespace_id).await?;

    let history = history_to_messages(&req.history)?;
    let result = answer::answer(
        state.embedder.as_ref(),
        state.index.as_ref(),
        state.completer.as_ref(),
        &state.config.retrieval,
        &req.namespace_id,
        &req.query,
        &history,
    )
    .await?;
    Ok(Json(result))
}

// ============ Landing page ============

#[derive(Deserialize)]
struct LandingPageRequest {
    description: String,
}

async fn handle_landing_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LandingPageRequest>,
) -> Result<Json<GeneratedLandingPage>, AppError> {
    identify(&state, &headers).await?;
    let page = landing::generate_landing_page(state.completer.as_ref(), &req.description).await?;
    Ok(Json(page))
}

// ============ Agent memory ============

async fn handle_create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MemoryConversation>, AppError> {
    let identity = identify(&state, &headers).await?;
    let conversation = memory::create_conversation(&state.pool, &identity).await?;
    Ok(Json(conversation))
}

#[derive(Serialize)]
struct ConversationListResponse {
    conversations: Vec<MemoryConversation>,
}

async fn handle_list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConversationListResponse>, AppError> {
    let identity = identify(&state, &headers).await?;
    let conversations = memory::list_conversations(&state.pool, &identity).await?;
    Ok(Json(ConversationListResponse { conversations }))
}

#[derive(Serialize)]
struct ConversationMessagesResponse {
    messages: Vec<MemoryMessage>,
}

async fn handle_conversation_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ConversationMessagesResponse>, AppError> {
    let identity = identify(&state, &headers).await?;
    let messages = memory::get_messages(&state.pool, &identity, &id).await?;
    Ok(Json(ConversationMessagesResponse { messages }))
}

#[derive(Deserialize)]
struct MemorySendRequest {
    content: String,
}

async fn handle_memory_send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<MemorySendRequest>,
) -> Result<Json<MemoryExchange>, AppError> {
    let identity = identify(&state, &headers).await?;
    let exchange = memory::send_prompt(
        &state.pool,
        state.completer.as_ref(),
        &identity,
        &id,
        &req.content,
    )
    .await?;
    Ok(Json(exchange))
}

async fn handle_delete_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let identity = identify(&state, &headers).await?;
    memory::delete_conversation(&state.pool, &identity, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ============ Inference ============

#[derive(Deserialize)]
struct InferenceChatRequest {
    messages: Vec<InferenceMessage>,
}

#[derive(Deserialize)]
struct InferenceMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct InferenceResponse {
    content: String,
}

async fn handle_inference_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InferenceChatRequest>,
) -> Result<Json<InferenceResponse>, AppError> {
    identify(&state, &headers).await?;
    if req.messages.is_empty() {
        return Err(ActionError::validation("messages must not be empty").into());
    }

    let mut messages = Vec::with_capacity(req.messages.len());
    for item in &req.messages {
        let role = match item.role.as_str() {
            "system" => ChatRole::System,
            "user" => ChatRole::User,
            "assistant" => ChatRole::Assistant,
            other => {
                return Err(
                    ActionError::validation(format!("invalid message role: {}", other)).into(),
                )
            }
        };
        messages.push(ChatMessage {
            role,
            content: MessageContent::Text(item.content.clone()),
        });
    }

    let content = state
        .completer
        .complete(&messages)
        .await
        .map_err(|e| ActionError::collaborator(format!("completion failed: {}", e)))?;
    Ok(Json(InferenceResponse { content }))
}

#[derive(Deserialize)]
struct MultimodalRequest {
    prompt: String,
    image_url: String,
}

async fn handle_inference_multimodal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MultimodalRequest>,
) -> Result<Json<InferenceResponse>, AppError> {
    identify(&state, &headers).await?;
    if req.prompt.trim().is_empty() {
        return Err(ActionError::validation("prompt is required").into());
    }
    let is_image = req.image_url.starts_with("data:image/")
        || req.image_url.starts_with("http://")
        || req.image_url.starts_with("https://");
    if !is_image {
        return Err(ActionError::validation("image_url must be an image data URL or link").into());
    }

    let messages = vec![ChatMessage::user_with_image(&req.prompt, &req.image_url)];
    let content = state
        .completer
        .complete(&messages)
        .await
        .map_err(|e| ActionError::collaborator(format!("completion failed: {}", e)))?;
    Ok(Json(InferenceResponse { content }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Collaborator), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn history_roles_validated() {
        let ok = history_to_messages(&[
            HistoryItem {
                role: "user".to_string(),
                content: "hi".to_string(),
            },
            HistoryItem {
                role: "assistant".to_string(),
                content: "hello".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(ok.len(), 2);

        let err = history_to_messages(&[HistoryItem {
            role: "system".to_string(),
            content: "sneaky".to_string(),
        }])
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
