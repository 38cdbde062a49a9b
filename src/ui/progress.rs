use indicatif::{ProgressBar, ProgressStyle};

/// 下载进度的观察接口，只用于展示，不影响下载结果
pub trait ProgressReporter: Send + Sync {
    fn start(&self, total: u64, initial: u64, label: &str);
    fn advance(&self, bytes: u64);
    fn finish(&self);
}

/// 不显示任何进度
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total: u64, _initial: u64, _label: &str) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}

// 结构体：TrackProgress
// 用于显示单个音轨的下载进度条
pub struct TrackProgress {
    bar: ProgressBar,
}

impl TrackProgress {
    pub fn new(visible: bool) -> Self {
        let bar = if visible { ProgressBar::new(0) } else { ProgressBar::hidden() };
        let style = ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressReporter for TrackProgress {
    fn start(&self, total: u64, initial: u64, label: &str) {
        self.bar.set_length(total);
        self.bar.set_position(initial);
        self.bar.set_message(label.to_string());
    }

    fn advance(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_tracks_position() {
        let progress = TrackProgress::new(false);
        progress.start(1000, 400, "01");
        progress.advance(100);
        progress.advance(500);
        assert_eq!(progress.position(), 1000);
        progress.finish();
    }
}
