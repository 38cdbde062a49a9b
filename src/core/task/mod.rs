//! `task` 模块包含了与单个下载任务相关的所有逻辑
//!
//! 主要包括：
//! - `state`: 任务阶段 `DownloadPhase` 与由临时文件推断的 `TransferState`
//! - `download`: 断点续传下载器 `ResumableDownloader`
//! - `util`: 工具类，如临时文件路径与 `ChunkWriter`

pub mod state;
pub mod download;
pub mod util;

// 导出核心组件，方便外部使用
pub use download::{DownloadOutcome, ResumableDownloader};
pub use state::{DownloadPhase, DownloadTask, TransferState};
pub use self::util::{temp_path_for, ChunkWriter, TEMP_SUFFIX};
