use serde_json::Value;

use crate::{
    config::UpstreamConfig,
    error::ProxyError,
    llm::ChatUpstream,
    models::{ChatCompletion, Message},
};

/**
 * \brief 校验原始请求体，取出用户消息。
 * \param payload 前端提交的 JSON
 */
pub fn validate_chat_request(payload: &Value) -> Result<String, ProxyError> {
    match payload.get("message") {
        None | Some(Value::Null) => Err(ProxyError::InvalidArgument(
            "Field `message` is required.".to_string(),
        )),
        Some(Value::String(message)) if message.trim().is_empty() => Err(
            ProxyError::InvalidArgument("Field `message` must not be empty.".to_string()),
        ),
        Some(Value::String(message)) => Ok(message.clone()),
        Some(_) => Err(ProxyError::InvalidArgument(
            "Field `message` must be a string.".to_string(),
        )),
    }
}

/**
 * \brief 构造发往上游的消息序列：固定系统提示词 + 用户消息。
 */
pub fn build_messages(system_prompt: &str, message: &str) -> Vec<Message> {
    vec![Message::system(system_prompt), Message::user(message)]
}

/**
 * \brief Chat Proxy：校验、转发一次、返回上游结果，不做重试。
 */
pub async fn handle_chat(
    upstream: &dyn ChatUpstream,
    config: &UpstreamConfig,
    payload: &Value,
) -> Result<ChatCompletion, ProxyError> {
    let message = validate_chat_request(payload)?;
    let messages = build_messages(&config.system_prompt, &message);
    upstream.send_chat_completion(&messages).await
}
