use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::core::error::DownloadError;
use super::util::temp_path_for;

/// 单个下载任务经历的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Init,
    SizeCheck,
    Skip,
    ResumeOrFresh,
    Streaming,
    Finalize,
    Done,
    Failed,
}

impl fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadPhase::Init => "INIT",
            DownloadPhase::SizeCheck => "SIZE_CHECK",
            DownloadPhase::Skip => "SKIP",
            DownloadPhase::ResumeOrFresh => "RESUME_OR_FRESH",
            DownloadPhase::Streaming => "STREAMING",
            DownloadPhase::Finalize => "FINALIZE",
            DownloadPhase::Done => "DONE",
            DownloadPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// 下载任务：从创建到重命名完成（或放弃）为止
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub track_id: String,
    pub target: PathBuf,
    pub temp: PathBuf,
    /// 首次响应之前未知
    pub total_size: Option<u64>,
    pub bytes_on_disk: u64,
    pub label: String,
    phase: DownloadPhase,
}

impl DownloadTask {
    pub fn new(track_id: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let temp = temp_path_for(&target);
        let label = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            track_id: track_id.into(),
            target,
            temp,
            total_size: None,
            bytes_on_disk: 0,
            label,
            phase: DownloadPhase::Init,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    pub fn enter(&mut self, phase: DownloadPhase) {
        debug!("[{}] {} -> {}", self.track_id, self.phase, phase);
        self.phase = phase;
    }
}

/// 由临时文件推断出的传输状态，不单独持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Fresh,
    Partial(u64),
    Complete,
}

impl TransferState {
    pub async fn inspect(temp: &Path, total: u64) -> Result<Self, DownloadError> {
        let on_disk = match tokio::fs::metadata(temp).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Self::classify(on_disk, total)
    }

    pub fn classify(on_disk: u64, total: u64) -> Result<Self, DownloadError> {
        if on_disk > total {
            Err(DownloadError::TempFileOverflow { on_disk, expected: total })
        } else if on_disk == total {
            Ok(TransferState::Complete)
        } else if on_disk == 0 {
            Ok(TransferState::Fresh)
        } else {
            Ok(TransferState::Partial(on_disk))
        }
    }

    /// 续传的起始字节
    pub fn first_byte(&self, total: u64) -> u64 {
        match self {
            TransferState::Fresh => 0,
            TransferState::Partial(on_disk) => *on_disk,
            TransferState::Complete => total,
        }
    }
}
