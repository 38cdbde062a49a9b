use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use crate::core::error::DownloadError;

pub const DEFAULT_API_BASE_URL: &str = "https://www.qobuz.com/api.json/0.2";

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 应用 ID（X-App-Id）
    pub app_id: String,
    /// 用户令牌（X-User-Auth-Token）
    pub token: String,
    /// 用于请求签名的应用密钥
    pub app_secret: String,
    /// 音质格式 ID，27 为最高规格 FLAC
    pub format_id: u32,
    /// 下载根目录
    pub download_dir: String,
    /// API 地址
    pub api_base_url: String,
    /// 首次失败后的最大重试次数
    pub max_retries: u32,
    /// 重试延迟（秒）
    pub retry_delay: u64,
    /// 重试延迟倍数，1.0 表示固定间隔
    pub backoff_multiplier: f64,
    /// 最大重试延迟（秒）
    pub retry_max_delay: u64,
    /// 重试延迟抖动比例（0~1），0 表示不抖动
    pub retry_jitter: f64,
    /// 请求超时时间（秒）
    pub timeout: u64,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
    /// 写盘块大小（字节）
    pub chunk_size: usize,
    /// User-Agent
    pub user_agent: String,
    /// 日志文件
    pub log_file: String,
    /// 控制台日志级别
    pub log_level: String,
    /// 批量下载时读取的专辑列表文件
    pub albums_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            token: String::new(),
            app_secret: String::new(),
            format_id: 27,
            download_dir: ".".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_retries: 5,
            retry_delay: 2,
            backoff_multiplier: 1.0,
            retry_max_delay: 60,
            retry_jitter: 0.0,
            timeout: 60,
            connect_timeout: 15,
            chunk_size: 1024,
            user_agent: format!("qdown/{}", env!("CARGO_PKG_VERSION")),
            log_file: "qd.log".to_string(),
            log_level: "info".to_string(),
            albums_file: "albums.txt".to_string(),
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            // 格式错误时直接报错，避免覆盖已有凭据
            toml::from_str(&content)
                .map_err(|e| DownloadError::config(format!("配置文件格式错误 {}: {}", path, e)))
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tutorial_content = Config::generate_tutorial_content();
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n\n{}", tutorial_content, config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    /// 生成配置文件教程内容（静态方法）
    fn generate_tutorial_content() -> String {
        r#"# qdown 配置文件
# ====================
#
# 这是一个 TOML 格式的配置文件。
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   qdown 0060253780968                 # 下载整张专辑
#   qdown 0060253780968 1 3 5-7         # 下载专辑中的第 1、3、5、7 首
#   qdown -a 0060253780968 -t 2 4       # 同上，显式指定
#   qdown -f                            # 下载 albums_file 中列出的全部专辑
#   qdown --list 0060253780968          # 只列出曲目
#   qdown -e                            # 编辑配置文件

# ==================== 账号设置 ====================
#
# app_id / token / app_secret 必须填写，否则无法下载。
# app_secret 可以通过 `qdown --extract-secrets` 获取。

# ==================== 下载设置 ====================
#
# format_id: 5 = MP3 320, 6 = FLAC 16bit, 7 = FLAC 24bit ≤96kHz, 27 = FLAC 24bit ≤192kHz
# download_dir: 文件保存为 <download_dir>/<艺术家>/<专辑>/<NN>-<标题>.flac
# chunk_size: 每次写盘的字节数

# ==================== 网络设置 ====================
#
# max_retries: 每个请求首次失败后最多重试的次数
# retry_delay: 重试间隔（秒）
# backoff_multiplier: 大于 1 时每次重试间隔按倍数增长，上限 retry_max_delay
# retry_jitter: 0~1 之间，重试间隔在 ±(retry_jitter/2) 范围内随机浮动
# timeout / connect_timeout: 请求与连接超时（秒）

# ==================== 日志设置 ====================
#
# log_file: 日志文件，记录 DEBUG 及以上级别
# log_level: 控制台日志级别（error / warn / info / debug / trace）

# ==================== 故障排除 ====================
#
# 问题：提示 "服务器不支持断点续传"
# 解决：删除对应的 .downloading 临时文件后重新运行
#
# 问题：经常下载失败
# 解决：增加 max_retries 或 timeout 值
#
# 问题：HTTP 401 / 400
# 解决：token 过期或 app_secret 不正确

# ==================== 配置项 ====================
"#.to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.format_id == 0 {
            return Err(DownloadError::config("format_id 必须大于0"));
        }
        if self.download_dir.trim().is_empty() {
            return Err(DownloadError::config("下载目录不能为空"));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(DownloadError::config("api_base_url 不能为空"));
        }
        if url::Url::parse(&self.api_base_url).is_err() {
            return Err(DownloadError::config(format!("api_base_url 无效: {}", self.api_base_url)));
        }
        if self.timeout == 0 || self.connect_timeout == 0 {
            return Err(DownloadError::config("超时时间必须大于0"));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::config("块大小必须大于0"));
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err(DownloadError::config("backoff_multiplier 不能小于 1.0"));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter) {
            return Err(DownloadError::config("retry_jitter 必须在 0 到 1 之间"));
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(DownloadError::config(format!("无效的日志级别: {}", self.log_level)));
        }
        Ok(())
    }

    /// 下载前必须具备的凭据
    pub fn require_credentials(&self) -> Result<(), DownloadError> {
        for (name, value) in [
            ("app_id", &self.app_id),
            ("token", &self.token),
            ("app_secret", &self.app_secret),
        ] {
            if value.trim().is_empty() {
                return Err(DownloadError::config(format!("配置值为空: {}", name)));
            }
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(download_dir) = &args.download_dir {
            self.download_dir = download_dir.clone();
        }

        if let Some(format_id) = args.format_id {
            self.format_id = format_id;
        }

        if let Some(max_retries) = args.max_retries {
            self.max_retries = max_retries;
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 音质格式: {}\n\
            - 应用 ID: {}\n\
            - 令牌: {}\n\
            - 重试: {} 次, 间隔 {} 秒{}\n\
            - 超时时间: {} 秒",
            self.download_dir,
            self.format_id,
            if self.app_id.is_empty() { "未设置" } else { self.app_id.as_str() },
            mask(&self.token),
            self.max_retries,
            self.retry_delay,
            if self.backoff_multiplier > 1.0 {
                format!(" (x{} 递增, 上限 {} 秒)", self.backoff_multiplier, self.retry_max_delay)
            } else {
                String::new()
            },
            self.timeout,
        )
    }
}

fn mask(secret: &str) -> String {
    match secret.char_indices().nth(4) {
        None if secret.is_empty() => "未设置".to_string(),
        None => "****".to_string(),
        Some((idx, _)) => format!("{}****", &secret[..idx]),
    }
}
