//! 用 ffmpeg 计算 PCM 数据的 MD5 并写回 FLAC STREAMINFO
//!
//! 部分来源的 FLAC 文件 STREAMINFO 中 MD5 为全零，播放器无法校验完整性。

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use tokio::process::Command;
use walkdir::WalkDir;

use crate::core::error::DownloadError;

const FLAC_MARKER: &[u8; 4] = b"fLaC";
/// "fLaC" + 4 字节块头 + STREAMINFO 内 18 字节偏移
const MD5_OFFSET: u64 = 4 + 4 + 18;
const STREAMINFO_LEN: usize = 34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub bits_per_sample: u8,
    pub md5: [u8; 16],
}

/// 解析文件开头的 STREAMINFO 块
pub fn parse_streaminfo(header: &[u8]) -> Result<StreamInfo, DownloadError> {
    if header.len() < 8 + STREAMINFO_LEN || &header[..4] != FLAC_MARKER {
        return Err(DownloadError::InvalidResponse("不是有效的 FLAC 文件".into()));
    }
    let block_type = header[4] & 0x7f;
    if block_type != 0 {
        return Err(DownloadError::InvalidResponse("第一个元数据块不是 STREAMINFO".into()));
    }

    let info = &header[8..8 + STREAMINFO_LEN];
    // 采样位数占 5 位，跨越第 12、13 字节
    let bits_per_sample = (((info[12] & 0x01) << 4) | (info[13] >> 4)) + 1;
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&info[18..34]);

    Ok(StreamInfo { bits_per_sample, md5 })
}

pub fn read_streaminfo(path: &Path) -> Result<StreamInfo, DownloadError> {
    let mut header = [0u8; 8 + STREAMINFO_LEN];
    std::fs::File::open(path)?.read_exact(&mut header)?;
    parse_streaminfo(&header)
}

pub fn write_md5(path: &Path, md5: &[u8; 16]) -> Result<(), DownloadError> {
    read_streaminfo(path)?;
    let mut file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(MD5_OFFSET))?;
    file.write_all(md5)?;
    file.sync_all()?;
    Ok(())
}

/// 解析 `ffmpeg -f md5` 的输出，例如 `MD5=0123...`
pub fn parse_ffmpeg_md5(output: &str) -> Result<[u8; 16], DownloadError> {
    let hex = output
        .trim()
        .split_once('=')
        .map(|(_, hex)| hex.trim())
        .filter(|hex| hex.len() == 32)
        .ok_or_else(|| DownloadError::InvalidResponse(format!("无法解析 ffmpeg 输出: {}", output.trim())))?;

    let mut md5 = [0u8; 16];
    for (i, byte) in md5.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| DownloadError::InvalidResponse(format!("无效的 MD5: {}", hex)))?;
    }
    if md5.iter().all(|b| *b == 0) {
        return Err(DownloadError::InvalidResponse("ffmpeg 返回了全零的 MD5".into()));
    }
    Ok(md5)
}

pub fn ffmpeg_args(input: &Path, bits_per_sample: u8) -> Result<Vec<String>, DownloadError> {
    let input = input.to_string_lossy().into_owned();
    let args: Vec<&str> = match bits_per_sample {
        16 => vec!["-i", input.as_str(), "-map", "0:a", "-f", "md5", "-"],
        24 => vec!["-i", input.as_str(), "-map", "0:a", "-c:a", "pcm_s24le", "-f", "md5", "-"],
        other => {
            return Err(DownloadError::InvalidResponse(format!("只支持16bit/24bit, 实际 {}bit", other)));
        }
    };
    Ok(args.into_iter().map(String::from).collect())
}

pub async fn ffmpeg_md5(path: &Path, bits_per_sample: u8) -> Result<[u8; 16], DownloadError> {
    let output = Command::new("ffmpeg")
        .args(ffmpeg_args(path, bits_per_sample)?)
        .output()
        .await?;
    if !output.status.success() {
        return Err(DownloadError::InvalidResponse(format!(
            "FFmpeg Error: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_ffmpeg_md5(&String::from_utf8_lossy(&output.stdout))
}

pub async fn repair_file(path: &Path) -> Result<(), DownloadError> {
    let info = read_streaminfo(path)?;
    let md5 = ffmpeg_md5(path, info.bits_per_sample).await?;
    write_md5(path, &md5)
}

/// 递归查找目录下的所有 .flac 文件，不跟随符号链接；无法读取的目录只记录日志
pub fn find_flac_files(dir: &Path) -> Result<Vec<PathBuf>, DownloadError> {
    if !dir.is_dir() {
        return Err(DownloadError::config(format!("目录不存在: {}", dir.display())));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("跳过无法读取的路径: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_some_and(|ext| ext.eq_ignore_ascii_case("flac")) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// 逐个修复目录下的 FLAC 文件，单个文件失败不影响其它文件
pub async fn repair_directory(dir: &Path) -> Result<Vec<(PathBuf, Result<(), DownloadError>)>, DownloadError> {
    let mut results = Vec::new();
    for file in find_flac_files(dir)? {
        let result = repair_file(&file).await;
        match &result {
            Ok(()) => info!("写入成功：{}", file.display()),
            Err(e) => error!("错误：{}: {}", file.display(), e),
        }
        results.push((file, result));
    }
    Ok(results)
}
