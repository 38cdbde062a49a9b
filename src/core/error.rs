use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// 错误分类，决定错误是否重试、是否中止整个运行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 缺少凭据或配置无效，启动时即失败
    Configuration,
    /// 网络或 HTTP 失败，按重试预算重试
    Transport,
    /// 服务器响应违反约定，不重试
    Protocol,
    /// 下载已完成，但标签或封面失败
    PartialFailure,
    /// 本地文件系统错误
    Io,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("配置错误: {0}")]
    Config(Cow<'static, str>),

    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("服务器错误: HTTP {status} ({url})")]
    HttpStatus { status: u16, url: String },

    #[error("重试次数超过限制: 共尝试 {attempts} 次, 最后一次错误: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        last: Box<DownloadError>,
    },

    #[error("服务器不支持断点续传: 期望 206, 实际 {0}")]
    RangeNotSupported(u16),

    #[error("响应缺少有效的 Content-Length")]
    MissingContentLength,

    #[error("响应缺少字段: {0}")]
    MissingField(Cow<'static, str>),

    #[error("无法解析响应: {0}")]
    InvalidResponse(String),

    #[error("临时文件大于预期: 已有 {on_disk} 字节, 预期 {expected} 字节")]
    TempFileOverflow { on_disk: u64, expected: u64 },

    #[error("文件大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("标签写入失败: {0}")]
    Tagging(String),

    #[error("IO错误: {0}")]
    IoError(#[from] io::Error),
}

impl DownloadError {
    pub fn config(msg: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::Config(msg.into())
    }

    pub fn missing_field(field: impl Into<Cow<'static, str>>) -> Self {
        DownloadError::MissingField(field.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Config(_) => ErrorKind::Configuration,
            DownloadError::NetworkError(_)
            | DownloadError::HttpStatus { .. }
            | DownloadError::MaxRetriesExceeded { .. } => ErrorKind::Transport,
            DownloadError::RangeNotSupported(_)
            | DownloadError::MissingContentLength
            | DownloadError::MissingField(_)
            | DownloadError::InvalidResponse(_)
            | DownloadError::TempFileOverflow { .. }
            | DownloadError::SizeMismatch { .. } => ErrorKind::Protocol,
            DownloadError::Tagging(_) => ErrorKind::PartialFailure,
            DownloadError::IoError(_) => ErrorKind::Io,
        }
    }

    /// 只有单次请求级别的传输失败才值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::NetworkError(_) | DownloadError::HttpStatus { .. }
        )
    }

    /// 致命错误会中止整个运行，而不仅是当前音轨
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(error: reqwest::Error) -> Self {
        DownloadError::NetworkError(error.to_string())
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(error: serde_json::Error) -> Self {
        DownloadError::InvalidResponse(error.to_string())
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(DownloadError::NetworkError("connection reset".into()).is_retryable());
        assert!(DownloadError::HttpStatus { status: 503, url: "http://x".into() }.is_retryable());

        assert!(!DownloadError::RangeNotSupported(200).is_retryable());
        assert!(!DownloadError::MissingContentLength.is_retryable());
        assert!(!DownloadError::config("app_id").is_retryable());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(DownloadError::config("token 为空").kind(), ErrorKind::Configuration);
        assert_eq!(DownloadError::missing_field("url").kind(), ErrorKind::Protocol);
        assert_eq!(DownloadError::Tagging("bad flac".into()).kind(), ErrorKind::PartialFailure);

        let exhausted = DownloadError::MaxRetriesExceeded {
            attempts: 6,
            last: Box::new(DownloadError::NetworkError("timeout".into())),
        };
        assert_eq!(exhausted.kind(), ErrorKind::Transport);
        assert!(!exhausted.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        assert!(DownloadError::config("app_secret 为空").is_fatal());
        assert!(!DownloadError::RangeNotSupported(200).is_fatal());
        assert!(!DownloadError::IoError(io::Error::from(io::ErrorKind::NotFound)).is_fatal());
    }
}
