use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::core::error::DownloadError;

pub const TEMP_SUFFIX: &str = ".downloading";

/// `<target>.downloading`
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// 以追加方式写入临时文件的缓冲区，满 `buffer_size` 字节刷一次盘
pub struct ChunkWriter {
    buffer: Vec<u8>,
    buffer_size: usize,
    current_pos: usize,
    file_handle: File,
    start_offset: u64,
    total_written: u64,
}

impl ChunkWriter {
    pub async fn open_append(file_path: &Path, buffer_size: usize) -> Result<Self, DownloadError> {
        let file_handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)
            .await?;
        let start_offset = file_handle.metadata().await?.len();
        let buffer_size = buffer_size.max(1);

        Ok(Self {
            buffer: vec![0; buffer_size],
            buffer_size,
            current_pos: 0,
            file_handle,
            start_offset,
            total_written: 0,
        })
    }

    /// 向缓冲区写入数据
    pub async fn write(&mut self, data: &[u8]) -> Result<(), DownloadError> {
        let mut bytes_written = 0;
        while bytes_written < data.len() {
            let space_left = self.buffer_size - self.current_pos;
            let to_copy = std::cmp::min(space_left, data.len() - bytes_written);

            self.buffer[self.current_pos..self.current_pos + to_copy]
                .copy_from_slice(&data[bytes_written..bytes_written + to_copy]);
            self.current_pos += to_copy;
            bytes_written += to_copy;

            if self.current_pos == self.buffer_size {
                self.flush().await?;
            }
        }
        Ok(())
    }

    /// 将缓冲区内容刷入文件
    pub async fn flush(&mut self) -> Result<(), DownloadError> {
        if self.current_pos > 0 {
            self.file_handle.write_all(&self.buffer[..self.current_pos]).await?;
            self.total_written += self.current_pos as u64;
            self.current_pos = 0;
        }
        Ok(())
    }

    /// 刷新缓冲区并同步到磁盘
    pub async fn finish(&mut self) -> Result<(), DownloadError> {
        self.flush().await?;
        self.file_handle.flush().await?;
        self.file_handle.sync_all().await?;
        Ok(())
    }

    /// 文件当前的逻辑长度（含尚未刷盘的部分）
    pub fn position(&self) -> u64 {
        self.start_offset + self.total_written + self.current_pos as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_for() {
        assert_eq!(
            temp_path_for(Path::new("a/b/01-Song.flac")),
            PathBuf::from("a/b/01-Song.flac.downloading")
        );
    }

    #[tokio::test]
    async fn test_chunk_writer_appends_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.downloading");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let mut writer = ChunkWriter::open_append(&path, 4).await.unwrap();
        assert_eq!(writer.position(), 3);
        writer.write(b"defghij").await.unwrap();
        assert_eq!(writer.position(), 10);
        writer.finish().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdefghij");
    }
}
