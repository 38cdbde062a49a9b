//! 获取下载链接所需的签名请求参数

use md5::{Digest, Md5};

use crate::core::error::DownloadError;

/// 签名后的一次性请求参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub params: Vec<(String, String)>,
    /// 参与签名的时间戳，必须原样作为 `request_ts` 发送
    pub timestamp: i64,
}

impl SignedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn signature(&self) -> &str {
        self.param("request_sig").unwrap_or_default()
    }
}

/// 使用当前时间生成签名请求
pub fn build_signed_request(track_id: &str, format_id: u32, secret: &str) -> Result<SignedRequest, DownloadError> {
    // 时间戳只取一次，哈希输入和发送的参数共用同一个值
    let timestamp = chrono::Utc::now().timestamp();
    build_signed_request_at(track_id, format_id, secret, timestamp)
}

pub fn build_signed_request_at(
    track_id: &str,
    format_id: u32,
    secret: &str,
    timestamp: i64,
) -> Result<SignedRequest, DownloadError> {
    if track_id.trim().is_empty() {
        return Err(DownloadError::config("track_id 不能为空"));
    }
    if format_id == 0 {
        return Err(DownloadError::config("format_id 必须大于0"));
    }
    if secret.is_empty() {
        return Err(DownloadError::config("app_secret 不能为空"));
    }

    let payload = format!(
        "trackgetFileUrlformat_id{}intentstreamtrack_id{}{}{}",
        format_id, track_id, timestamp, secret
    );
    let signature = format!("{:x}", Md5::digest(payload.as_bytes()));

    Ok(SignedRequest {
        params: vec![
            ("request_ts".to_string(), timestamp.to_string()),
            ("request_sig".to_string(), signature),
            ("track_id".to_string(), track_id.to_string()),
            ("format_id".to_string(), format_id.to_string()),
            ("intent".to_string(), "stream".to_string()),
        ],
        timestamp,
    })
}
