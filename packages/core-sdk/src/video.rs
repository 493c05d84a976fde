use crate::{
    config::StorageConfig,
    error::ProxyError,
    models::{SignedUrl, VideoLinkRequest},
    storage::StorageBackend,
    telemetry,
};

/**
 * \brief 解析对象名：未提供或为空时回退到默认文件；拒绝 . 与 .. 路径段。
 */
pub fn resolve_video_key(
    request: &VideoLinkRequest,
    config: &StorageConfig,
) -> Result<String, ProxyError> {
    let key = request
        .file
        .as_deref()
        .map(|f| f.trim().trim_start_matches('/'))
        .filter(|f| !f.is_empty())
        .unwrap_or(config.default_file.as_str());
    if key.split('/').any(|seg| seg == "." || seg == "..") {
        return Err(ProxyError::InvalidArgument(format!(
            "Parameter `file` must not contain `.` or `..` segments: {:?}",
            key
        )));
    }
    Ok(key.to_string())
}

/**
 * \brief Video Link Issuer：每次请求都重新签发，不缓存。
 */
pub async fn issue_video_link(
    storage: &dyn StorageBackend,
    config: &StorageConfig,
    request: &VideoLinkRequest,
) -> Result<SignedUrl, ProxyError> {
    let key = resolve_video_key(request, config)?;
    match storage
        .create_signed_url(&config.bucket, &key, config.expires_in)
        .await
    {
        Ok(url) => {
            telemetry::log_event(
                "video",
                &format!("bucket={} key={}", config.bucket, key),
            );
            Ok(SignedUrl {
                url,
                expires_in_seconds: config.expires_in,
            })
        }
        Err(e) => {
            telemetry::log_error(
                "video",
                &format!("bucket={} key={} error={}", config.bucket, key, e),
            );
            Err(e)
        }
    }
}
