use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/**
 * \brief 请求处理阶段的错误，统一在 handler 边界转换为 JSON 错误体。
 */
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidArgument(String),

    /** \brief 上游返回非 2xx，状态码与响应体原样保留 */
    #[error("upstream responded with status {status}")]
    Upstream { status: u16, details: Value },

    #[error("{0}")]
    UpstreamDecode(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Storage(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ProxyError::UpstreamDecode(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Connection(_) | ProxyError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> Value {
        match self {
            ProxyError::Upstream { details, .. } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

/**
 * \brief 启动阶段的配置错误，出现即终止进程。
 */
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {key}")]
    Missing { key: String },

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown chat provider {0:?} (expected openrouter or huggingface)")]
    UnknownProvider(String),
}
