//! Core: 签名、传输与重试、断点续传下载任务以及顺序下载调度

pub mod error;
pub mod layout;
pub mod manager;
pub mod retry;
pub mod signer;
pub mod task;
pub mod transport;

// 只导出主流程和其它模块实际用到的类型
pub use error::{DownloadError, DownloadResult, ErrorKind};
pub use manager::DownloadManager;
pub use retry::{RetryStrategy, RetryingTransport};
pub use transport::{ReqwestTransport, Transport};
