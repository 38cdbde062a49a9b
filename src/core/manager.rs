//! 顺序驱动专辑/单曲下载：元数据 → 签名取链接 → 断点续传 → 写标签

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};

use crate::api::models::{Album, Track};
use crate::api::QobuzClient;
use crate::config::Config;
use crate::core::error::DownloadError;
use crate::core::layout;
use crate::core::task::{temp_path_for, DownloadOutcome, DownloadTask, ResumableDownloader};
use crate::core::transport::Transport;
use crate::tagging::Tagger;
use crate::ui::{RunSummary, TrackProgress};

/// 运行期间的计数
#[derive(Debug, Default, Clone)]
struct RunStats {
    total_tracks: usize,
    downloaded: usize,
    skipped: usize,
    failed: usize,
    failed_albums: usize,
    tag_failures: usize,
    bytes_transferred: u64,
}

pub struct DownloadManager {
    download_dir: PathBuf,
    client: QobuzClient,
    downloader: ResumableDownloader,
    tagger: Box<dyn Tagger>,
    stats: RunStats,
    started: Instant,
    show_progress: bool,
}

impl DownloadManager {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, tagger: Box<dyn Tagger>) -> Result<Self, DownloadError> {
        let client = QobuzClient::new(config, transport.clone())?;
        Ok(Self {
            download_dir: PathBuf::from(&config.download_dir),
            client,
            downloader: ResumableDownloader::new(transport, config.chunk_size),
            tagger,
            stats: RunStats::default(),
            started: Instant::now(),
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// 获取专辑信息，用于 --list
    pub async fn list_album(&self, album_id: &str) -> Result<Album, DownloadError> {
        self.client.get_album(album_id).await
    }

    /// 依次下载多张专辑，单张专辑失败不影响后续专辑；配置错误会中止整个运行
    pub async fn download_albums(&mut self, album_ids: &[String]) -> Result<(), DownloadError> {
        if album_ids.is_empty() {
            return Err(DownloadError::config("专辑列表不能为空"));
        }

        for album_id in album_ids {
            match self.client.get_album(album_id).await {
                Ok(album) => {
                    info!(
                        "专辑: {} - {} ({} 首)",
                        album.artist_name(),
                        album.full_title(),
                        album.track_items().len()
                    );
                    for track in album.track_items() {
                        self.process_track(&album, track).await?;
                    }
                }
                Err(e) => {
                    error!("获取专辑 {} 失败: {}", album_id, e);
                    self.stats.failed_albums += 1;
                }
            }
        }
        Ok(())
    }

    /// 按曲目编号（从 1 开始）下载专辑中的部分曲目
    pub async fn download_tracks(&mut self, album_id: &str, numbers: &[u32]) -> Result<(), DownloadError> {
        let album = self.client.get_album(album_id).await?;
        let tracks = album.track_items();

        for &number in numbers {
            let track = match (number as usize).checked_sub(1).and_then(|i| tracks.get(i)) {
                Some(track) => track,
                None => {
                    error!("曲目编号 {} 超出范围，专辑共 {} 首", number, tracks.len());
                    continue;
                }
            };
            self.process_track(&album, track).await?;
        }
        Ok(())
    }

    /// 下载单曲并记录结果；普通错误只记录日志，致命错误向上返回
    async fn process_track(&mut self, album: &Album, track: &Track) -> Result<(), DownloadError> {
        self.stats.total_tracks += 1;
        match self.download_track(album, track).await {
            Ok(DownloadOutcome::Skipped) => self.stats.skipped += 1,
            Ok(DownloadOutcome::Completed { transferred, .. }) => {
                self.stats.downloaded += 1;
                self.stats.bytes_transferred += transferred;
            }
            Err(e) => {
                error!("{:02}-{} 下载失败: {}", track.track_number, track.full_title(), e);
                self.stats.failed += 1;
                if e.is_fatal() {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub async fn download_track(&mut self, album: &Album, track: &Track) -> Result<DownloadOutcome, DownloadError> {
        let target = layout::track_path(&self.download_dir, album, track);
        // 已存在的文件不请求下载链接
        if tokio::fs::try_exists(&target).await? {
            info!("{}: 文件已存在，跳过", target.display());
            return Ok(DownloadOutcome::Skipped);
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = self.client.get_file_url(&track.id).await?;
        let mut task = DownloadTask::new(track.id.clone(), &target).with_label(format!("{:02}", track.track_number));
        let progress = TrackProgress::new(self.show_progress);
        let outcome = self.downloader.download(&mut task, &url, &progress).await?;
        info!("{} 下载完成", target.display());

        let cover = self.ensure_cover(album).await;
        if let Err(e) = self.tagger.write_tags(&target, album, track, cover.as_deref()) {
            warn!("写入标签失败: {}", e);
            self.stats.tag_failures += 1;
        }
        Ok(outcome)
    }

    /// 封面每张专辑只下载一次，之后从磁盘读取；失败只影响标签
    async fn ensure_cover(&self, album: &Album) -> Option<Vec<u8>> {
        let path = layout::cover_path(&self.download_dir, album);
        match self.load_or_fetch_cover(album, &path).await {
            Ok(cover) => cover,
            Err(e) => {
                warn!("获取封面失败 {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn load_or_fetch_cover(&self, album: &Album, path: &Path) -> Result<Option<Vec<u8>>, DownloadError> {
        if tokio::fs::try_exists(path).await? {
            return Ok(Some(tokio::fs::read(path).await?));
        }
        let Some(url) = album.cover_url() else {
            return Ok(None);
        };

        let data = self.client.fetch_bytes(&url).await?;
        let temp = temp_path_for(path);
        tokio::fs::write(&temp, &data).await?;
        tokio::fs::rename(&temp, path).await?;
        info!("封面已保存: {}", path.display());
        Ok(Some(data.to_vec()))
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_tracks: self.stats.total_tracks,
            downloaded: self.stats.downloaded,
            skipped: self.stats.skipped,
            failed: self.stats.failed,
            failed_albums: self.stats.failed_albums,
            tag_failures: self.stats.tag_failures,
            bytes_transferred: self.stats.bytes_transferred,
            elapsed_time: self.started.elapsed(),
        }
    }
}
