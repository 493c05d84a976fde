use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};

use crate::{
    chat,
    config::AppConfig,
    error::ProxyError,
    llm::{self, ChatUpstream},
    models::{ChatCompletion, ChatReply, SignedUrl, VideoLinkRequest},
    storage::{self, StorageBackend},
    telemetry, video,
};

/**
 * \brief 所有 handler 共享的只读状态。
 */
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub chat: Arc<dyn ChatUpstream>,
    pub storage: Arc<dyn StorageBackend>,
}

/**
 * \brief 构建路由：API + 前端静态资源（SPA 回退到 index.html）。
 */
pub fn router(state: AppState) -> Router {
    let ui_root = state.config.server.ui_dir.clone();
    let static_service = ServeDir::new(&ui_root)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(Path::new(&ui_root).join("index.html")));

    Router::new()
        .route("/api/chat", post(chat_proxy))
        .route("/api/chat/reply", post(chat_reply))
        .route("/api/video", get(video_link))
        .route("/api/health", get(health_check))
        .fallback_service(static_service)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/**
 * \brief 启动 HTTP 服务，Ctrl-C 时优雅退出。
 * \param config        启动时加载的配置
 * \param addr_override 覆盖配置中的监听地址，如 "127.0.0.1:5173"
 */
pub async fn run(config: AppConfig, addr_override: Option<&str>) -> Result<()> {
    let chat = llm::build_upstream(&config.upstream).context("build chat upstream failed")?;
    let storage = storage::build_storage(&config.storage).context("build storage failed")?;
    telemetry::set_enabled(config.server.telemetry_enabled);

    if !Path::new(&config.server.ui_dir).exists() {
        tracing::warn!(
            "ui dir {} not found, only the API will be served",
            config.server.ui_dir
        );
    }

    let addr = addr_override
        .map(str::to_string)
        .unwrap_or_else(|| config.server.listen_addr());
    tracing::info!(
        provider = %config.upstream.provider,
        model = %config.upstream.model,
        bucket = %config.storage.bucket,
        "starting chillroom server"
    );

    let app = router(AppState {
        config: Arc::new(config),
        chat,
        storage,
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {} failed", addr))?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("listen for ctrl-c failed: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

async fn forward_chat(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ChatCompletion, ProxyError> {
    let Json(payload) = payload.map_err(|e| ProxyError::InvalidArgument(e.body_text()))?;
    let result =
        chat::handle_chat(state.chat.as_ref(), &state.config.upstream, &payload).await;
    match &result {
        Ok(completion) => telemetry::log_event(
            "server.chat",
            &format!(
                "provider={} model={} reply_len={}",
                state.chat.kind(),
                state.chat.model(),
                completion
                    .reply
                    .as_ref()
                    .map(|r| r.text.len())
                    .unwrap_or_default()
            ),
        ),
        Err(ProxyError::InvalidArgument(msg)) => {
            tracing::debug!("rejected chat request: {}", msg)
        }
        Err(e) => telemetry::log_error(
            "server.chat",
            &format!("provider={} status={} error={}", state.chat.kind(), e.status_code(), e),
        ),
    }
    result
}

/**
 * \brief POST /api/chat：原样返回上游 JSON。
 */
async fn chat_proxy(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ProxyError> {
    let completion = forward_chat(&state, payload).await?;
    Ok(Json(completion.raw))
}

/**
 * \brief POST /api/chat/reply：返回归一化的 {"text": ...}。
 */
async fn chat_reply(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatReply>, ProxyError> {
    let completion = forward_chat(&state, payload).await?;
    completion.reply.map(Json).ok_or_else(|| {
        ProxyError::UpstreamDecode(format!(
            "unrecognized {} response shape",
            state.chat.kind()
        ))
    })
}

/**
 * \brief GET /api/video?file=...：签发 1 小时有效的视频地址。
 */
async fn video_link(
    State(state): State<AppState>,
    query: Result<Query<VideoLinkRequest>, QueryRejection>,
) -> Result<Json<SignedUrl>, ProxyError> {
    let Query(request) = query.map_err(|e| ProxyError::InvalidArgument(e.body_text()))?;
    let signed =
        video::issue_video_link(state.storage.as_ref(), &state.config.storage, &request).await?;
    Ok(Json(signed))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "provider": state.chat.kind().name(),
        "model": state.chat.model(),
        "bucket": state.config.storage.bucket,
    }))
}
