//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 下载整张专辑：`qdown <album_id>`
//! - 下载指定曲目：`qdown <album_id> 1 3 5` 或 `qdown -a <album_id> -t 1,3,5`
//! - 批量下载：`qdown -f`（读取配置中的 albums_file）
//! - 查看曲目列表：`qdown --list <album_id>`
//! - 编辑配置：`qdown -e`
//! - 提取应用密钥：`qdown --extract-secrets`
//! - 修复 FLAC MD5：`qdown --fix-md5 <DIR>`
//!
//! ## 配置文件位置
//!
//! - Windows: `%APPDATA%/qdown/qdown.conf`
//! - macOS: `~/Library/Application Support/qdown/qdown.conf`
//! - Linux: `~/.config/qdown/qdown.conf`

use std::env;
use std::fs;
use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::utils::validator::{parse_album_list, parse_track_numbers, validate_album_id};

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/qdown/qdown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/qdown/qdown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/qdown/qdown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// qdown 命令行参数
///
/// 示例用法：
///   qdown 0060253780968
///   qdown 0060253780968 1 3
///   qdown -f
///   qdown -e  # 编辑配置文件
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "qdown",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("VERGEN_BUILD_DATE"), ")"),
    about = "支持断点续传的专辑/单曲下载工具",
    long_about = "按专辑或曲目下载无损音频，自动写入标签与封面，中断后再次运行会从断点继续。\n\n示例：\n  qdown 0060253780968\n  qdown 0060253780968 1 3\n  qdown -a 0060253780968 -t 2,4\n  qdown -f\n  qdown --list 0060253780968\n"
)]
pub struct Args {
    /// 专辑 ID，后面可以跟曲目编号
    #[arg(required = false, help = "专辑 ID，后面可跟要下载的曲目编号。")]
    pub positional: Vec<String>,

    #[arg(short = 'a', long, help = "专辑 ID。")]
    pub album: Option<String>,

    #[arg(short = 't', long = "track", num_args = 1.., help = "要下载的曲目编号，可用逗号或空格分隔。")]
    pub track: Vec<String>,

    #[arg(short = 'f', long, help = "从配置中的 albums_file 读取专辑 ID 列表，每行一个。")]
    pub file: bool,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    #[arg(long, short = 'd', help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    #[arg(long, help = "音质格式 ID，覆盖配置文件中的设置。")]
    pub format_id: Option<u32>,

    #[arg(long, short = 'r', help = "最大重试次数，覆盖配置文件中的设置。")]
    pub max_retries: Option<u32>,

    #[arg(long, help = "只列出专辑曲目，不下载。")]
    pub list: bool,

    #[arg(long, help = "从网页播放器提取应用密钥并退出。")]
    pub extract_secrets: bool,

    #[arg(long, value_name = "DIR", help = "为目录下所有 FLAC 文件写入 STREAMINFO MD5 并退出。")]
    pub fix_md5: Option<PathBuf>,
}

/// 解析后的下载请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRequest {
    Albums(Vec<String>),
    Tracks { album_id: String, numbers: Vec<u32> },
}

impl Args {
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();
        let config = args.load_config()?;

        // --edit 逻辑：配置文件此时一定存在
        if args.edit_config {
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        Ok((args, config))
    }

    /// 加载或创建配置文件，合并命令行参数并校验
    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config.validate()?;
        Ok(config)
    }

    /// 根据参数确定要下载的专辑或曲目
    pub fn resolve_request(&self, config: &Config) -> Result<RunRequest, DownloadError> {
        if self.file {
            let content = fs::read_to_string(&config.albums_file).map_err(|e| {
                DownloadError::config(format!("无法读取专辑列表 {}: {}", config.albums_file, e))
            })?;
            let album_ids = parse_album_list(&content);
            if album_ids.is_empty() {
                return Err(DownloadError::config(format!("专辑列表为空: {}", config.albums_file)));
            }
            for album_id in &album_ids {
                validate_album_id(album_id).map_err(|e| DownloadError::config(e.to_string()))?;
            }
            return Ok(RunRequest::Albums(album_ids));
        }

        // -a 优先，否则第一个位置参数是专辑 ID，其余位置参数是曲目编号
        let mut positional = self.positional.iter();
        let album_id = match &self.album {
            Some(album) => album.clone(),
            None => positional
                .next()
                .cloned()
                .ok_or_else(|| DownloadError::config("未提供专辑 ID"))?,
        };
        validate_album_id(&album_id).map_err(|e| DownloadError::config(e.to_string()))?;

        let track_inputs: Vec<&str> = self
            .track
            .iter()
            .map(String::as_str)
            .chain(positional.map(String::as_str))
            .collect();
        if track_inputs.is_empty() {
            return Ok(RunRequest::Albums(vec![album_id]));
        }

        let numbers = parse_track_numbers(&track_inputs);
        if numbers.is_empty() {
            return Err(DownloadError::config(format!("无效的曲目编号: {}", track_inputs.join(" "))));
        }
        Ok(RunRequest::Tracks { album_id, numbers })
    }
}
