//! 从网页播放器的 bundle.js 中提取应用密钥

use base64::Engine;
use log::{debug, info};
use regex::Regex;

use crate::core::error::DownloadError;
use crate::core::transport::{HttpRequest, Transport};

pub const PLAYER_BASE_URL: &str = "https://play.qobuz.com";

/// 末尾 44 个字符是填充，不属于密钥
const SECRET_PADDING: usize = 44;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSecret {
    pub timezone: String,
    pub secret: String,
}

/// 在登录页中找到 bundle.js 的路径
pub fn find_bundle_path(login_html: &str) -> Option<String> {
    let re = Regex::new(r#"<script src="(/resources/\d+\.\d+\.\d+-[a-z]\d{3}/bundle\.js)"></script>"#).ok()?;
    re.captures(login_html).map(|caps| caps[1].to_string())
}

/// 从 bundle.js 内容中解析出各时区对应的密钥，顺序与播放器内部一致
pub fn extract_secrets(bundle: &str) -> Result<Vec<AppSecret>, DownloadError> {
    let seed_re = Regex::new(r#"[a-z]\.initialSeed\("(?P<seed>[\w=]+)",window\.utimezone\.(?P<timezone>[a-z]+)\)"#)
        .map_err(|e| DownloadError::InvalidResponse(e.to_string()))?;

    let mut parts: Vec<(String, String)> = Vec::new();
    for caps in seed_re.captures_iter(bundle) {
        let timezone = caps["timezone"].to_string();
        let seed = caps["seed"].to_string();
        match parts.iter_mut().find(|(tz, _)| *tz == timezone) {
            Some(entry) => entry.1 = seed,
            None => parts.push((timezone, seed)),
        }
    }
    if parts.is_empty() {
        return Err(DownloadError::missing_field("initialSeed"));
    }
    // 播放器优先使用第二个时区
    if parts.len() > 1 {
        let second = parts.remove(1);
        parts.insert(0, second);
    }

    let alternatives = parts
        .iter()
        .map(|(tz, _)| regex::escape(&capitalize(tz)))
        .collect::<Vec<_>>()
        .join("|");
    let info_re = Regex::new(&format!(
        r#"name:"\w+/(?P<timezone>{})",info:"(?P<info>[\w=]+)",extras:"(?P<extras>[\w=]+)""#,
        alternatives
    ))
    .map_err(|e| DownloadError::InvalidResponse(e.to_string()))?;

    for caps in info_re.captures_iter(bundle) {
        let timezone = caps["timezone"].to_lowercase();
        if let Some(entry) = parts.iter_mut().find(|(tz, _)| *tz == timezone) {
            entry.1.push_str(&caps["info"]);
            entry.1.push_str(&caps["extras"]);
        }
    }

    parts
        .into_iter()
        .map(|(timezone, joined)| {
            let secret = decode_secret(&joined)?;
            Ok(AppSecret { timezone, secret })
        })
        .collect()
}

fn decode_secret(joined: &str) -> Result<String, DownloadError> {
    let encoded = joined
        .char_indices()
        .nth_back(SECRET_PADDING - 1)
        .map(|(idx, _)| &joined[..idx])
        .unwrap_or("");
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| DownloadError::InvalidResponse(format!("密钥不是有效的 base64: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| DownloadError::InvalidResponse(format!("密钥不是有效的 UTF-8: {}", e)))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 下载登录页与 bundle.js 并提取密钥
pub async fn fetch_app_secrets(transport: &dyn Transport, base_url: &str) -> Result<Vec<AppSecret>, DownloadError> {
    let base_url = base_url.trim_end_matches('/');
    let login = transport
        .send(HttpRequest::get(format!("{}/login", base_url)))
        .await?
        .text()
        .await?;
    let bundle_path = find_bundle_path(&login).ok_or_else(|| DownloadError::missing_field("bundle.js"))?;
    info!("bundle 地址: {}{}", base_url, bundle_path);

    let bundle = transport
        .send(HttpRequest::get(format!("{}{}", base_url, bundle_path)))
        .await?
        .text()
        .await?;
    debug!("bundle.js 大小: {} 字节", bundle.len());

    extract_secrets(&bundle)
}
