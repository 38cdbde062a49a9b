//! HTTP 传输层抽象
//!
//! 所有出站请求都经过 [`Transport`]。具体实现是 [`ReqwestTransport`]，
//! 重试策略以装饰器的方式包裹在外层（见 `core::retry::RetryingTransport`）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt};

use crate::config::Config;
use crate::core::error::DownloadError;

pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// 一次出站请求的描述，可克隆以便重试时重新发送
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// 按名称查找请求头（忽略大小写）
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// 响应头已就绪、响应体以流的形式延迟读取
pub struct HttpResponse {
    pub status: u16,
    headers: HashMap<String, String>,
    body: ByteStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    pub fn new(status: u16, headers: HashMap<String, String>, body: ByteStream) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self { status, headers, body }
    }

    /// 用内存中的数据构造响应，按 `chunk_size` 切分响应体
    pub fn from_bytes(status: u16, headers: HashMap<String, String>, body: Bytes, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunks: Vec<Result<Bytes, DownloadError>> = (0..body.len())
            .step_by(chunk_size)
            .map(|start| Ok(body.slice(start..(start + chunk_size).min(body.len()))))
            .collect();
        Self::new(status, headers, futures::stream::iter(chunks).boxed())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }

    /// 读取完整响应体
    pub async fn bytes(self) -> Result<Bytes, DownloadError> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    pub async fn text(self) -> Result<String, DownloadError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DownloadError::InvalidResponse(format!("响应不是有效的 UTF-8: {}", e)))
    }
}

/// 出站 HTTP 调用接口，重试等行为通过组合实现
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DownloadError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DownloadError> {
        (**self).send(request).await
    }
}

/// 基于 reqwest 连接池的传输实现，不做任何状态码判断
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .read_timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DownloadError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DownloadError::from))
            .boxed();

        Ok(HttpResponse::new(status, headers, body))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用的内存传输层

    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, DownloadError> + Send + Sync>;

    struct Route {
        url_fragment: String,
        handler: Handler,
    }

    /// 按 URL 片段匹配路由，并记录所有收到的请求
    #[derive(Default)]
    pub struct FakeTransport {
        routes: Vec<Route>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn route<F>(mut self, url_fragment: &str, handler: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<HttpResponse, DownloadError> + Send + Sync + 'static,
        {
            self.routes.push(Route {
                url_fragment: url_fragment.to_string(),
                handler: Box::new(handler),
            });
            self
        }

        pub fn json(self, url_fragment: &str, body: serde_json::Value) -> Self {
            self.route(url_fragment, move |_| Ok(ok_response(body.to_string().into_bytes())))
        }

        /// 模拟支持 Range 的文件服务器
        pub fn file(self, url_fragment: &str, content: Vec<u8>) -> Self {
            let content = Bytes::from(content);
            self.route(url_fragment, move |request| Ok(serve_range(request, &content, true)))
        }

        /// 模拟忽略 Range、总是返回 200 全量内容的服务器
        pub fn file_without_range(self, url_fragment: &str, content: Vec<u8>) -> Self {
            let content = Bytes::from(content);
            self.route(url_fragment, move |request| Ok(serve_range(request, &content, false)))
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn requests_to(&self, url_fragment: &str) -> Vec<HttpRequest> {
            self.requests()
                .into_iter()
                .filter(|r| r.url.contains(url_fragment))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, DownloadError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.routes.iter().find(|r| request.url.contains(&r.url_fragment)) {
                Some(route) => (route.handler)(&request),
                None => Ok(HttpResponse::from_bytes(404, HashMap::new(), Bytes::new(), 1)),
            }
        }
    }

    pub fn ok_response(body: Vec<u8>) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("Content-Length".to_string(), body.len().to_string());
        HttpResponse::from_bytes(200, headers, Bytes::from(body), 64)
    }

    pub fn serve_range(request: &HttpRequest, content: &Bytes, supports_range: bool) -> HttpResponse {
        let len = content.len() as u64;
        let range = request
            .header_value("Range")
            .and_then(|r| r.strip_prefix("bytes="))
            .and_then(|r| r.split_once('-'))
            .and_then(|(start, end)| Some((start.parse::<u64>().ok()?, end.parse::<u64>().ok())));

        match range {
            Some((start, end)) if supports_range => {
                let end = end.unwrap_or(len.saturating_sub(1)).min(len.saturating_sub(1));
                let body = if start <= end && start < len {
                    content.slice(start as usize..=end as usize)
                } else {
                    Bytes::new()
                };
                let mut headers = HashMap::new();
                headers.insert("Content-Length".to_string(), body.len().to_string());
                headers.insert("Content-Range".to_string(), format!("bytes {}-{}/{}", start, end, len));
                HttpResponse::from_bytes(206, headers, body, 100)
            }
            _ => {
                let mut headers = HashMap::new();
                headers.insert("Content-Length".to_string(), len.to_string());
                HttpResponse::from_bytes(200, headers, content.clone(), 100)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_response_from_bytes_reassembles_body() {
        let body = Bytes::from((0u8..=255).collect::<Vec<u8>>());
        let response = HttpResponse::from_bytes(200, HashMap::new(), body.clone(), 7);
        assert!(response.is_success());
        assert_eq!(response.bytes().await.unwrap(), body);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("Content-Length".to_string(), " 1000 ".to_string());
        let response = HttpResponse::from_bytes(206, headers, Bytes::new(), 1);
        assert_eq!(response.header("CONTENT-LENGTH"), Some(" 1000 "));
        assert_eq!(response.content_length(), Some(1000));
    }

    #[test]
    fn test_missing_content_length() {
        let response = HttpResponse::from_bytes(200, HashMap::new(), Bytes::new(), 1);
        assert_eq!(response.content_length(), None);
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::post("https://example.com/api")
            .query("album_id", "abc")
            .header("X-App-Id", "42");
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.query_value("album_id"), Some("abc"));
        assert_eq!(request.header_value("x-app-id"), Some("42"));
        assert_eq!(request.header_value("Range"), None);
    }
}
