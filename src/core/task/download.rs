use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info};

use crate::core::error::DownloadError;
use crate::core::transport::{ByteStream, HttpRequest, Transport};
use crate::ui::ProgressReporter;
use super::state::{DownloadPhase, DownloadTask, TransferState};
use super::util::ChunkWriter;

/// 一次下载的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// 目标文件已存在，没有任何网络请求
    Skipped,
    /// 文件已发布到目标路径
    Completed { resumed_from: u64, transferred: u64 },
}

/// 支持断点续传的单文件下载器
///
/// 数据先追加到 `<target>.downloading`，全部收齐后通过一次原子重命名发布。
/// 中途失败时只会留下可续传的临时文件，目标路径要么不存在，要么是完整文件。
pub struct ResumableDownloader {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
}

impl ResumableDownloader {
    pub fn new(transport: Arc<dyn Transport>, chunk_size: usize) -> Self {
        Self {
            transport,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn download(
        &self,
        task: &mut DownloadTask,
        url: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<DownloadOutcome, DownloadError> {
        match self.run(task, url, progress).await {
            Ok(outcome) => {
                task.enter(DownloadPhase::Done);
                Ok(outcome)
            }
            Err(error) => {
                debug!("[{}] 在 {} 阶段失败: {}", task.track_id, task.phase(), error);
                task.enter(DownloadPhase::Failed);
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        task: &mut DownloadTask,
        url: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<DownloadOutcome, DownloadError> {
        if tokio::fs::try_exists(&task.target).await? {
            task.enter(DownloadPhase::Skip);
            info!("{}: 文件已存在，跳过", task.target.display());
            return Ok(DownloadOutcome::Skipped);
        }

        task.enter(DownloadPhase::SizeCheck);
        let head = self.transport.send(HttpRequest::get(url)).await?;
        let total = head.content_length().ok_or(DownloadError::MissingContentLength)?;
        // 只需要响应头，响应体直接丢弃
        drop(head);
        task.total_size = Some(total);

        task.enter(DownloadPhase::ResumeOrFresh);
        let state = TransferState::inspect(&task.temp, total).await?;
        let first_byte = state.first_byte(total);
        task.bytes_on_disk = first_byte;

        let mut transferred = 0;
        if state != TransferState::Complete {
            if first_byte > 0 {
                info!("{}: 从第 {} 字节继续下载", task.label, first_byte);
            }
            task.enter(DownloadPhase::Streaming);
            transferred = self.stream(task, url, first_byte, total, progress).await?;
        }

        task.enter(DownloadPhase::Finalize);
        finalize(task).await?;

        Ok(DownloadOutcome::Completed {
            resumed_from: first_byte,
            transferred,
        })
    }

    async fn stream(
        &self,
        task: &mut DownloadTask,
        url: &str,
        first_byte: u64,
        total: u64,
        progress: &dyn ProgressReporter,
    ) -> Result<u64, DownloadError> {
        let request = HttpRequest::get(url).header("Range", format!("bytes={}-{}", first_byte, total));
        let response = self.transport.send(request).await?;
        if response.status != 206 {
            return Err(DownloadError::RangeNotSupported(response.status));
        }

        let mut writer = ChunkWriter::open_append(&task.temp, self.chunk_size).await?;
        progress.start(total, first_byte, &task.label);

        let copied = copy_body(response.into_stream(), &mut writer, total, progress).await;
        // 无论成功与否都把已收到的数据落盘，下次从这里续传
        let flushed = writer.finish().await;
        task.bytes_on_disk = writer.position();
        progress.finish();
        copied?;
        flushed?;

        if writer.position() != total {
            return Err(DownloadError::SizeMismatch {
                expected: total,
                actual: writer.position(),
            });
        }
        Ok(writer.position() - first_byte)
    }
}

async fn copy_body(
    mut body: ByteStream,
    writer: &mut ChunkWriter,
    total: u64,
    progress: &dyn ProgressReporter,
) -> Result<(), DownloadError> {
    while let Some(chunk) = body.next().await {
        let bytes = chunk?;
        let len = bytes.len() as u64;
        // 临时文件长度不得超过预期总大小
        if writer.position() + len > total {
            return Err(DownloadError::SizeMismatch {
                expected: total,
                actual: writer.position() + len,
            });
        }
        writer.write(&bytes).await?;
        progress.advance(len);
    }
    Ok(())
}

/// 唯一的提交点：临时文件原子重命名为目标文件
async fn finalize(task: &DownloadTask) -> Result<(), DownloadError> {
    if !tokio::fs::try_exists(&task.temp).await? {
        // 零字节文件不会产生临时文件
        tokio::fs::File::create(&task.temp).await?;
    }
    tokio::fs::rename(&task.temp, &task.target).await?;
    Ok(())
}
