use std::{str::FromStr, time::Duration};

use crate::{error::ConfigError, llm::ProviderKind};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Bạn là một trợ lý thân thiện và thông minh, trả lời bằng tiếng Việt.";
pub const DEFAULT_VIDEO_FILE: &str = "Chiyonoo.mp4";
pub const DEFAULT_VIDEO_BUCKET: &str = "music";
/** \brief 签名地址有效期固定为 1 小时 */
pub const SIGNED_URL_EXPIRES_IN: u64 = 3600;
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 10000;

/**
 * \brief 进程级配置，启动时构建一次，之后只读共享。
 */
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/**
 * \brief 上游 LLM Provider 配置。
 */
#[derive(Clone)]
pub struct UpstreamConfig {
    pub provider: ProviderKind,
    /** \brief API 基地址，不含 /chat/completions */
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /** \brief 固定的系统提示词，每次请求都会置于首条 */
    pub system_prompt: String,
    pub timeout: Duration,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

// api_key 不进入日志
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("provider", &self.provider)
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

/**
 * \brief 对象存储（Supabase Storage）配置。
 */
#[derive(Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub service_key: String,
    pub bucket: String,
    /** \brief 请求未携带 file 参数时使用的对象名 */
    pub default_file: String,
    pub expires_in: u64,
    /** \brief 签名请求超时，超时按存储错误处理 */
    pub timeout: Duration,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("default_file", &self.default_file)
            .field("expires_in", &self.expires_in)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /** \brief 前端构建产物目录 */
    pub ui_dir: String,
    pub telemetry_enabled: bool,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AppConfig {
    /**
     * \brief 读取 .env 与进程环境变量构建配置。
     */
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /**
     * \brief 通过任意查找函数构建配置；空字符串视为未设置。
     */
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| ConfigError::Missing {
                key: key.to_string(),
            })
        };

        let provider = match get("CHILLROOM_PROVIDER") {
            Some(name) => name.parse::<ProviderKind>()?,
            None => ProviderKind::OpenRouter,
        };

        let upstream = UpstreamConfig {
            provider,
            api_key: require(provider.credential_var())?,
            api_base: get("CHILLROOM_API_BASE")
                .unwrap_or_else(|| provider.default_api_base().to_string()),
            model: get("CHILLROOM_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            system_prompt: get("CHILLROOM_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            timeout: Duration::from_secs(
                parse_opt("CHILLROOM_CHAT_TIMEOUT_SECS", get("CHILLROOM_CHAT_TIMEOUT_SECS"))?
                    .unwrap_or(DEFAULT_CHAT_TIMEOUT_SECS),
            ),
            max_tokens: parse_opt("CHILLROOM_MAX_TOKENS", get("CHILLROOM_MAX_TOKENS"))?,
            temperature: parse_opt("CHILLROOM_TEMPERATURE", get("CHILLROOM_TEMPERATURE"))?,
        };
        ensure_positive("CHILLROOM_CHAT_TIMEOUT_SECS", upstream.timeout)?;

        let storage = StorageConfig {
            base_url: require("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            service_key: require("SUPABASE_SERVICE_ROLE_KEY")?,
            bucket: get("CHILLROOM_VIDEO_BUCKET").unwrap_or_else(|| DEFAULT_VIDEO_BUCKET.to_string()),
            default_file: get("CHILLROOM_DEFAULT_VIDEO")
                .unwrap_or_else(|| DEFAULT_VIDEO_FILE.to_string()),
            expires_in: SIGNED_URL_EXPIRES_IN,
            timeout: Duration::from_secs(
                parse_opt(
                    "CHILLROOM_STORAGE_TIMEOUT_SECS",
                    get("CHILLROOM_STORAGE_TIMEOUT_SECS"),
                )?
                .unwrap_or(DEFAULT_STORAGE_TIMEOUT_SECS),
            ),
        };
        ensure_positive("CHILLROOM_STORAGE_TIMEOUT_SECS", storage.timeout)?;

        let server = ServerConfig {
            host: get("CHILLROOM_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_opt("PORT", get("PORT"))?.unwrap_or(DEFAULT_PORT),
            ui_dir: get("CHILLROOM_UI_DIR").unwrap_or_else(|| "dist".to_string()),
            telemetry_enabled: parse_opt("CHILLROOM_TELEMETRY", get("CHILLROOM_TELEMETRY"))?
                .unwrap_or(false),
        };

        Ok(AppConfig {
            upstream,
            storage,
            server,
        })
    }
}

fn ensure_positive(key: &str, timeout: Duration) -> Result<(), ConfigError> {
    if timeout.is_zero() {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: "0".to_string(),
            reason: "timeout must be positive".to_string(),
        });
    }
    Ok(())
}

fn parse_opt<T>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
