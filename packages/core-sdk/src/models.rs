use serde::{Deserialize, Serialize};
use serde_json::Value;

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色：system/user/assistant */
    pub role: String,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/**
 * \brief 前端提交的聊天请求体。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /** \brief 用户输入，必须为非空字符串 */
    pub message: String,
}

/**
 * \brief 归一化后的模型回复，与具体 Provider 的返回结构无关。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
}

/**
 * \brief 一次上游调用的结果：原样保留的 JSON 与适配器归一化后的回复。
 */
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    /** \brief 上游返回的原始 JSON，/api/chat 原样透传 */
    pub raw: Value,
    /** \brief 无法识别返回结构时为 None */
    pub reply: Option<ChatReply>,
}

/**
 * \brief GET /api/video 的查询参数。
 */
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoLinkRequest {
    #[serde(default)]
    pub file: Option<String>,
}

/**
 * \brief 带有效期的签名地址。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_in_seconds: u64,
}
