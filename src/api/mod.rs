//! API: 远程音乐服务的元数据、下载链接与应用密钥

pub mod client;
pub mod models;
pub mod secrets;

pub use client::QobuzClient;
pub use models::{display_title, Album, Track};
pub use secrets::{extract_secrets, fetch_app_secrets, AppSecret};
