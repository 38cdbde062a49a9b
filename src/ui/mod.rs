mod progress;

use std::fmt;
pub use progress::{NoProgress, ProgressReporter, TrackProgress};

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// 一次运行结束后的汇总
pub struct RunSummary {
    pub total_tracks: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// 元数据获取失败、整张跳过的专辑
    pub failed_albums: usize,
    pub tag_failures: usize,
    pub bytes_transferred: u64,
    pub elapsed_time: std::time::Duration,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.failed_albums > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "音轨总数: {}", self.total_tracks)?;
        writeln!(f, "已下载: {}", self.downloaded)?;
        writeln!(f, "已存在跳过: {}", self.skipped)?;
        writeln!(f, "失败: {}", self.failed)?;
        if self.failed_albums > 0 {
            writeln!(f, "获取失败的专辑: {}", self.failed_albums)?;
        }
        if self.tag_failures > 0 {
            writeln!(f, "标签写入失败: {}", self.tag_failures)?;
        }
        writeln!(f, "传输数据: {}", format_size(self.bytes_transferred))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        Ok(())
    }
}

/// 打印专辑曲目列表
pub fn print_tracklist(album: &crate::api::Album) {
    println!("{} - {}", album.artist_name(), album.full_title());
    for (index, track) in album.track_items().iter().enumerate() {
        println!("{:02} - {}", index + 1, track.full_title());
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
