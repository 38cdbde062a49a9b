use chrono::Local; // 用于获取本地时间
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// 日志文件默认最大 10MB
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// 文件日志固定记录到 DEBUG 级别
const FILE_LEVEL: LevelFilter = LevelFilter::Debug;

pub fn format_line(level: log::Level, message: &std::fmt::Arguments) -> String {
    format!("[{}] {}: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), level, message)
}

/// 按大小轮转的日志文件
pub struct RotatingFile {
    writer: BufWriter<File>,
    file_path: String,
    max_size: u64,
    current_size: u64,
}

impl RotatingFile {
    pub fn new(file_path: &str, max_size: u64) -> Result<Self, std::io::Error> {
        // 确保日志目录存在
        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            writer: BufWriter::new(file),
            file_path: file_path.to_string(),
            max_size,
            current_size,
        })
    }

    /// 超过上限时把当前文件改名为 `.backup` 并重新创建
    fn check_rotation(&mut self) -> Result<(), std::io::Error> {
        if self.current_size > self.max_size {
            self.writer.flush()?;

            let backup_path = format!("{}.backup", self.file_path);
            if Path::new(&backup_path).exists() {
                std::fs::remove_file(&backup_path)?;
            }
            std::fs::rename(&self.file_path, &backup_path)?;

            let file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
            self.writer = BufWriter::new(file);
            self.current_size = 0;
        }
        Ok(())
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), std::io::Error> {
        self.check_rotation()?;
        self.writer.write_all(line.as_bytes())?;
        self.current_size += line.len() as u64;
        self.writer.flush()
    }
}

/// 控制台 + 文件双路输出的日志器
pub struct AppLogger {
    console: env_logger::Logger,
    file: Option<Mutex<RotatingFile>>,
}

impl AppLogger {
    pub fn new(console_level: LevelFilter, file: Option<RotatingFile>) -> Self {
        let console = env_logger::Builder::new()
            .filter_level(console_level)
            .parse_default_env()
            .format(|buf, record| buf.write_all(format_line(record.level(), record.args()).as_bytes()))
            .build();

        Self {
            console,
            file: file.map(Mutex::new),
        }
    }

    pub fn max_level(&self) -> LevelFilter {
        if self.file.is_some() {
            self.console.filter().max(FILE_LEVEL)
        } else {
            self.console.filter()
        }
    }
}

impl Log for AppLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || (self.file.is_some() && metadata.level() <= FILE_LEVEL)
    }

    fn log(&self, record: &Record) {
        if self.console.matches(record) {
            self.console.log(record);
        }

        if let Some(file) = &self.file {
            if record.level() <= FILE_LEVEL {
                let line = format_line(record.level(), record.args());
                if let Ok(mut file) = file.lock() {
                    if let Err(e) = file.write_line(&line) {
                        eprintln!("日志写入失败: {}", e);
                    }
                }
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.writer.flush();
            }
        }
    }
}

/// 初始化全局日志；日志文件打不开时只输出到控制台
pub fn init(log_file: Option<&str>, console_level: &str) -> Result<(), log::SetLoggerError> {
    let level = console_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    let file = log_file.and_then(|path| match RotatingFile::new(path, DEFAULT_MAX_LOG_SIZE) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("无法打开日志文件 {}: {}", path, e);
            None
        }
    });

    let logger = AppLogger::new(level, file);
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let line = format_line(log::Level::Warn, &format_args!("磁盘空间不足"));
        assert!(line.starts_with('['));
        assert!(line.ends_with("] WARN: 磁盘空间不足\n"));
    }

    #[test]
    fn test_rotating_file_rotates_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/qd.log");
        let path = path.to_str().unwrap();

        let mut file = RotatingFile::new(path, 16).unwrap();
        file.write_line("first line that is long\n").unwrap();
        file.write_line("second\n").unwrap();

        let backup = std::fs::read_to_string(format!("{}.backup", path)).unwrap();
        assert_eq!(backup, "first line that is long\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "second\n");
    }

    #[test]
    fn test_file_sink_widens_max_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qd.log");
        let file = RotatingFile::new(path.to_str().unwrap(), DEFAULT_MAX_LOG_SIZE).unwrap();

        let logger = AppLogger::new(LevelFilter::Warn, Some(file));
        assert_eq!(logger.max_level(), LevelFilter::Debug);

        let console_only = AppLogger::new(LevelFilter::Warn, None);
        assert!(console_only.max_level() <= LevelFilter::Warn || std::env::var("RUST_LOG").is_ok());
    }
}
