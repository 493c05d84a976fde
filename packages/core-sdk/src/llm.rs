use std::{str::FromStr, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::{
    config::UpstreamConfig,
    error::{ConfigError, ProxyError},
    models::{ChatCompletion, ChatReply, Message},
};

const CONNECTION_ERROR_MESSAGE: &str = "Failed to reach the chat provider.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenRouter,
    HuggingFace,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::HuggingFace => "huggingface",
        }
    }

    /** \brief 该 Provider 的凭据所在环境变量 */
    pub fn credential_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
            ProviderKind::HuggingFace => "HF_TOKEN",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::HuggingFace => "https://router.huggingface.co/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenRouter => "google/gemma-2-9b-it",
            ProviderKind::HuggingFace => "zai-org/GLM-4.6",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "huggingface" | "hf" => Ok(ProviderKind::HuggingFace),
            _ => Err(ConfigError::UnknownProvider(s.trim().to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/**
 * \brief 上游 Chat Completion 能力的统一抽象，由配置决定具体实现。
 */
#[async_trait]
pub trait ChatUpstream: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /**
     * \brief 发送一次 Chat Completion 请求，不做重试。
     */
    async fn send_chat_completion(&self, messages: &[Message])
        -> Result<ChatCompletion, ProxyError>;
}

/**
 * \brief OpenRouter 与 Hugging Face Router 共用的 OpenAI 兼容实现。
 */
pub struct OpenAiCompatibleUpstream {
    client: reqwest::Client,
    kind: ProviderKind,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl OpenAiCompatibleUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            kind: config.provider,
            endpoint: format!(
                "{}/chat/completions",
                config.api_base.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

#[async_trait]
impl ChatUpstream for OpenAiCompatibleUpstream {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_chat_completion(
        &self,
        messages: &[Message],
    ) -> Result<ChatCompletion, ProxyError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&self.request_body(messages))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(provider = %self.kind, error = %e, "chat upstream unreachable");
                ProxyError::Connection(CONNECTION_ERROR_MESSAGE.to_string())
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            tracing::warn!(provider = %self.kind, error = %e, "chat upstream body read failed");
            ProxyError::Connection(CONNECTION_ERROR_MESSAGE.to_string())
        })?;

        if !status.is_success() {
            let details = match serde_json::from_str::<Value>(&text) {
                Ok(v) => v,
                Err(_) => Value::String(text),
            };
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                details,
            });
        }

        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            ProxyError::UpstreamDecode(format!("chat provider returned invalid JSON: {}", e))
        })?;
        let reply = normalize_reply(self.kind, &raw);
        Ok(ChatCompletion { raw, reply })
    }
}

/**
 * \brief 根据配置构建上游实现。
 */
pub fn build_upstream(config: &UpstreamConfig) -> Result<Arc<dyn ChatUpstream>> {
    Ok(Arc::new(OpenAiCompatibleUpstream::new(config)?))
}

/**
 * \brief 各 Provider 的返回结构适配器，统一为 ChatReply。
 */
pub fn normalize_reply(kind: ProviderKind, v: &Value) -> Option<ChatReply> {
    let text = extract_openai_content(v).or_else(|| extract_simple_response(v));
    let text = match kind {
        ProviderKind::OpenRouter => text,
        ProviderKind::HuggingFace => text.or_else(|| extract_generated_text(v)),
    };
    text.map(|text| ChatReply { text })
}

fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

fn extract_simple_response(v: &Value) -> Option<String> {
    v.get("response")
        .and_then(|r| r.as_str())
        .map(|s| s.to_string())
}

// 旧版 Inference API：[{"generated_text": "..."}]
fn extract_generated_text(v: &Value) -> Option<String> {
    v.get(0)
        .and_then(|item| item.get("generated_text"))
        .or_else(|| v.get("generated_text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SYSTEM_PROMPT;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    fn upstream_config(api_base: &str) -> UpstreamConfig {
        UpstreamConfig {
            provider: ProviderKind::OpenRouter,
            api_base: api_base.to_string(),
            api_key: "sk-test".to_string(),
            model: "google/gemma-2-9b-it".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(5),
            max_tokens: None,
            temperature: None,
        }
    }

    async fn spawn_mock(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock");
        });
        format!("http://{}", addr)
    }

    fn conversation() -> Vec<Message> {
        vec![Message::system(DEFAULT_SYSTEM_PROMPT), Message::user("hello")]
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("OpenRouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        assert_eq!("hf".parse::<ProviderKind>().unwrap(), ProviderKind::HuggingFace);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_unknown_provider_keeps_raw_input() {
        let err = " Cohere ".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err, ConfigError::UnknownProvider("Cohere".to_string()));
    }

    #[test]
    fn test_normalize_reply_shapes() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(
            normalize_reply(ProviderKind::OpenRouter, &openai).map(|r| r.text),
            Some("hi".to_string())
        );

        let simple = json!({"response": "xin chào"});
        assert_eq!(
            normalize_reply(ProviderKind::HuggingFace, &simple).map(|r| r.text),
            Some("xin chào".to_string())
        );

        let legacy = json!([{"generated_text": "legacy"}]);
        assert_eq!(
            normalize_reply(ProviderKind::HuggingFace, &legacy).map(|r| r.text),
            Some("legacy".to_string())
        );
        assert!(normalize_reply(ProviderKind::OpenRouter, &legacy).is_none());
        assert!(normalize_reply(ProviderKind::OpenRouter, &json!({"choices": []})).is_none());
    }

    #[test]
    fn test_request_body_includes_optional_sampling() {
        let mut cfg = upstream_config("https://openrouter.ai/api/v1/");
        let upstream = OpenAiCompatibleUpstream::new(&cfg).expect("build");
        assert_eq!(upstream.endpoint, "https://openrouter.ai/api/v1/chat/completions");
        let body = upstream.request_body(&conversation());
        assert_eq!(body["model"], "google/gemma-2-9b-it");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());

        cfg.max_tokens = Some(150);
        cfg.temperature = Some(0.5);
        let upstream = OpenAiCompatibleUpstream::new(&cfg).expect("build");
        let body = upstream.request_body(&conversation());
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["temperature"], 0.5);
    }

    #[tokio::test]
    async fn test_success_passes_json_through() {
        let seen = Arc::new(Mutex::new(None::<(String, Value)>));
        let seen_in = seen.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let seen = seen_in.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *seen.lock().unwrap() = Some((auth, body));
                    Json(json!({"id": "gen-1", "choices": [{"message": {"content": "hi"}}]}))
                }
            }),
        );
        let base = spawn_mock(app).await;
        let upstream = OpenAiCompatibleUpstream::new(&upstream_config(&base)).expect("build");

        let completion = upstream
            .send_chat_completion(&conversation())
            .await
            .expect("completion");
        assert_eq!(completion.raw["id"], "gen-1");
        assert_eq!(completion.reply.map(|r| r.text), Some("hi".to_string()));

        let (auth, body) = seen.lock().unwrap().clone().expect("request captured");
        assert_eq!(auth, "Bearer sk-test");
        assert_eq!(body["messages"][0]["content"], DEFAULT_SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn test_non_success_status_is_preserved() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({"error": {"message": "model overloaded"}})),
                )
            }),
        );
        let base = spawn_mock(app).await;
        let upstream = OpenAiCompatibleUpstream::new(&upstream_config(&base)).expect("build");

        match upstream.send_chat_completion(&conversation()).await {
            Err(ProxyError::Upstream { status, details }) => {
                assert_eq!(status, 503);
                assert_eq!(details["error"]["message"], "model overloaded");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error_body_kept_as_string() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = spawn_mock(app).await;
        let upstream = OpenAiCompatibleUpstream::new(&upstream_config(&base)).expect("build");

        match upstream.send_chat_completion(&conversation()).await {
            Err(ProxyError::Upstream { status, details }) => {
                assert_eq!(status, 401);
                assert_eq!(details, Value::String("bad key".to_string()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_on_success_is_decode_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                hits_in.fetch_add(1, Ordering::SeqCst);
                async { "<html>oops</html>" }
            }),
        );
        let base = spawn_mock(app).await;
        let upstream = OpenAiCompatibleUpstream::new(&upstream_config(&base)).expect("build");

        let err = upstream
            .send_chat_completion(&conversation())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamDecode(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                hits_in.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({"choices": [{"message": {"content": "too late"}}]}))
                }
            }),
        );
        let base = spawn_mock(app).await;
        let mut cfg = upstream_config(&base);
        cfg.timeout = Duration::from_millis(300);
        let upstream = OpenAiCompatibleUpstream::new(&cfg).expect("build");

        let started = std::time::Instant::now();
        let err = upstream
            .send_chat_completion(&conversation())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Connection(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let upstream =
            OpenAiCompatibleUpstream::new(&upstream_config(&format!("http://{}", addr)))
                .expect("build");
        let err = upstream
            .send_chat_completion(&conversation())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Connection(_)));
    }
}
