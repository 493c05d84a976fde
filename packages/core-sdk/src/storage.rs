use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Url,
};
use serde_json::{json, Value};

use crate::{config::StorageConfig, error::ProxyError};

/**
 * \brief 对象存储签名能力的抽象。
 */
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /**
     * \brief 为指定对象生成限时访问地址。
     * \param bucket     存储桶
     * \param key        对象名
     * \param expires_in 有效期（秒）
     */
    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: u64,
    ) -> Result<String, ProxyError>;
}

/**
 * \brief Supabase Storage 的 REST 实现，使用 service role key 签名。
 */
pub struct SupabaseStorage {
    client: reqwest::Client,
    /** \brief 形如 https://xxx.supabase.co/storage/v1 */
    storage_base: String,
    service_key: String,
}

impl SupabaseStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Url::parse(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            storage_base: format!("{}/storage/v1", config.base_url.trim_end_matches('/')),
            service_key: config.service_key.clone(),
        })
    }

    fn sign_url(&self, bucket: &str, key: &str) -> Result<Url, ProxyError> {
        // url 会折叠 . 与 ..，签出的将是另一个对象
        if key.split('/').any(|seg| seg == "." || seg == "..") {
            return Err(ProxyError::InvalidArgument(format!(
                "invalid object key {:?}",
                key
            )));
        }
        let mut url = Url::parse(&self.storage_base)
            .map_err(|e| ProxyError::Storage(format!("invalid storage url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProxyError::Storage("invalid storage url".to_string()))?
            .extend(["object", "sign", bucket])
            .extend(key.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn headers(&self) -> Result<HeaderMap, ProxyError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.service_key))
            .map_err(|e| ProxyError::Storage(e.to_string()))?;
        let apikey = HeaderValue::from_str(&self.service_key)
            .map_err(|e| ProxyError::Storage(e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);
        Ok(headers)
    }
}

#[async_trait]
impl StorageBackend for SupabaseStorage {
    async fn create_signed_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: u64,
    ) -> Result<String, ProxyError> {
        let resp = self
            .client
            .post(self.sign_url(bucket, key)?)
            .headers(self.headers()?)
            .json(&json!({ "expiresIn": expires_in }))
            .send()
            .await
            .map_err(|e| ProxyError::Storage(format!("storage request failed: {}", e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProxyError::Storage(format!("storage request failed: {}", e)))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(ProxyError::Storage(error_message(&body).unwrap_or_else(
                || {
                    if text.trim().is_empty() {
                        format!("storage responded with status {}", status.as_u16())
                    } else {
                        text.clone()
                    }
                },
            )));
        }

        let signed = body
            .get("signedURL")
            .or_else(|| body.get("signedUrl"))
            .and_then(|s| s.as_str())
            .ok_or_else(|| ProxyError::Storage("storage response missing signedURL".to_string()))?;
        Ok(format!("{}{}", self.storage_base, signed))
    }
}

// Supabase 错误体：{"statusCode":"404","error":"not_found","message":"Object not found"}
fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
}

/**
 * \brief 根据配置构建存储实现。
 */
pub fn build_storage(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    Ok(Arc::new(SupabaseStorage::new(config)?))
}
