use std::sync::Arc;

use bytes::Bytes;
use log::debug;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::core::signer::build_signed_request;
use crate::core::transport::{HttpRequest, HttpResponse, Transport};
use super::models::{Album, FileUrl};

/// 音乐服务的元数据与下载链接接口
pub struct QobuzClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    app_id: String,
    token: String,
    app_secret: String,
    format_id: u32,
}

impl QobuzClient {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, DownloadError> {
        config.require_credentials()?;
        Ok(Self {
            transport,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            token: config.token.clone(),
            app_secret: config.app_secret.clone(),
            format_id: config.format_id,
        })
    }

    /// 非 2xx 响应视为错误
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DownloadError> {
        let url = request.url.clone();
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(DownloadError::HttpStatus { status: response.status, url });
        }
        Ok(response)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("X-App-Id", self.app_id.as_str())
            .header("X-User-Auth-Token", self.token.as_str())
    }

    /// 获取专辑信息（含曲目列表）
    pub async fn get_album(&self, album_id: &str) -> Result<Album, DownloadError> {
        let request = self.authorized(
            HttpRequest::post(format!("{}/album/get", self.base_url))
                .query("album_id", album_id)
                .query("offset", "0"),
        );
        let text = self.send(request).await?.text().await?;
        debug!("album/get {}: {}", album_id, text);

        let value: serde_json::Value = serde_json::from_str(&text)?;
        if value.get("tracks").is_none() {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("没有找到该专辑的信息");
            return Err(DownloadError::MissingField(format!("tracks ({}: {})", album_id, message).into()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 通过签名请求获取单曲的临时下载链接
    pub async fn get_file_url(&self, track_id: &str) -> Result<String, DownloadError> {
        let signed = build_signed_request(track_id, self.format_id, &self.app_secret)?;
        let mut request = HttpRequest::post(format!("{}/track/getFileUrl", self.base_url));
        for (key, value) in signed.params {
            request = request.query(key, value);
        }
        let text = self.send(self.authorized(request)).await?.text().await?;
        debug!("track/getFileUrl {}: {}", track_id, text);

        let file_url: FileUrl = serde_json::from_str(&text)?;
        file_url
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DownloadError::missing_field("url"))
    }

    /// 下载任意资源（用于封面）
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, DownloadError> {
        self.send(HttpRequest::get(url)).await?.bytes().await
    }
}
