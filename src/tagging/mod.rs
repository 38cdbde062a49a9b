//! 为下载完成的 FLAC 文件写入 Vorbis 标签与封面

pub mod checksum;

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::tag::{ItemKey, ItemValue, Tag, TagItem};
use log::debug;

use crate::api::models::{Album, Track};
use crate::core::error::DownloadError;

/// 标签写入接口，仅在文件发布到最终路径之后调用
pub trait Tagger: Send + Sync {
    fn write_tags(&self, path: &Path, album: &Album, track: &Track, cover: Option<&[u8]>) -> Result<(), DownloadError>;
}

/// 把专辑与单曲信息映射为标签项，空值不写入
pub fn build_tag_fields(album: &Album, track: &Track) -> Vec<(ItemKey, String)> {
    let named = |n: &Option<crate::api::models::Named>| n.as_ref().map(|n| n.name.clone());
    let number = |n: Option<u32>| n.map(|n| n.to_string());

    let fields = [
        (ItemKey::AlbumTitle, Some(album.full_title())),
        (ItemKey::AlbumArtist, Some(album.artist_name().to_string())),
        (ItemKey::Unknown("ALBUMID".into()), Some(album.id.clone())),
        (ItemKey::Comment, album.url.clone()),
        (ItemKey::RecordingDate, album.release_date_original.clone()),
        (ItemKey::Unknown("RELEASETYPE".into()), album.release_type.clone()),
        (ItemKey::Unknown("UPC".into()), album.upc.clone()),
        (ItemKey::DiscTotal, number(album.media_count)),
        (ItemKey::TrackTotal, number(album.tracks_count)),
        (ItemKey::ContentGroup, named(&album.genre)),
        (ItemKey::Label, named(&album.label)),
        (ItemKey::Genre, album.genres_list.first().cloned()),
        (ItemKey::TrackTitle, Some(track.full_title())),
        (ItemKey::CopyrightMessage, track.copyright.clone()),
        (ItemKey::Isrc, track.isrc.clone()),
        (ItemKey::Unknown("TRACKID".into()), Some(track.id.clone())),
        (ItemKey::DiscNumber, number(track.media_number)),
        (ItemKey::TrackNumber, Some(track.track_number.to_string())),
        (ItemKey::TrackArtist, named(&track.performer)),
        (ItemKey::Composer, named(&track.composer)),
        (
            ItemKey::Unknown("PERFORMERS".into()),
            track
                .performers
                .as_ref()
                .map(|p| p.replace('\r', "").replace(" - ", "\n")),
        ),
    ];

    fields
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value?.trim().to_string();
            (!value.is_empty()).then_some((key, value))
        })
        .collect()
}

/// 基于 lofty 的 FLAC 标签写入器
#[derive(Debug, Default, Clone, Copy)]
pub struct FlacTagger;

impl Tagger for FlacTagger {
    fn write_tags(&self, path: &Path, album: &Album, track: &Track, cover: Option<&[u8]>) -> Result<(), DownloadError> {
        let tagging_error = |e: lofty::error::LoftyError| DownloadError::Tagging(format!("{}: {}", path.display(), e));

        let mut tagged_file = lofty::read_from_path(path).map_err(tagging_error)?;
        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| DownloadError::Tagging(format!("{}: 无法创建标签", path.display())))?;

        for (key, value) in build_tag_fields(album, track) {
            if let ItemKey::Unknown(_) = key {
                // 自定义字段无法通过映射校验，按原样写入
                tag.insert_unchecked(TagItem::new(key, ItemValue::Text(value)));
                continue;
            }
            let name = format!("{:?}", key);
            if !tag.insert_text(key, value) {
                debug!("{}: 标签项 {} 不适用于此格式", path.display(), name);
            }
        }

        if let Some(data) = cover {
            while !tag.pictures().is_empty() {
                tag.remove_picture(0);
            }
            tag.push_picture(Picture::new_unchecked(
                PictureType::CoverFront,
                Some(MimeType::Jpeg),
                None,
                data.to_vec(),
            ));
        }

        tag.save_to_path(path, WriteOptions::default()).map_err(tagging_error)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// 只有 STREAMINFO 的最小 FLAC 文件：44.1kHz 双声道，1 秒
    pub fn flac_header(bits_per_sample: u8) -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();
        // 最后一个元数据块 | STREAMINFO，长度 34
        bytes.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
        let mut info = [0u8; 34];
        let bps = bits_per_sample - 1;
        // 最小/最大块大小 4096
        info[0] = 0x10;
        info[2] = 0x10;
        // 采样率 44100 (20 bit) | 声道数-1 (3 bit) | 采样位数-1 (5 bit) | 总采样数 (36 bit)
        info[10] = 0x0a;
        info[11] = 0xc4;
        info[12] = 0x40 | (0x01 << 1) | (bps >> 4);
        info[13] = (bps & 0x0f) << 4;
        info[16] = 0xac;
        info[17] = 0x44;
        bytes.extend_from_slice(&info);
        bytes.extend_from_slice(b"audio frames");
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::fixtures::album_json;

    fn album() -> Album {
        serde_json::from_value(album_json()).unwrap()
    }

    fn value_of<'a>(fields: &'a [(ItemKey, String)], key: &ItemKey) -> Option<&'a str> {
        fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_tag_fields_for_first_track() {
        let album = album();
        let fields = build_tag_fields(&album, &album.track_items()[0]);

        assert_eq!(value_of(&fields, &ItemKey::AlbumTitle), Some("Blue Train (Remastered)"));
        assert_eq!(value_of(&fields, &ItemKey::AlbumArtist), Some("John Coltrane"));
        assert_eq!(value_of(&fields, &ItemKey::Genre), Some("Jazz"));
        assert_eq!(value_of(&fields, &ItemKey::ContentGroup), Some("Jazz"));
        assert_eq!(value_of(&fields, &ItemKey::Label), Some("Blue Note"));
        assert_eq!(value_of(&fields, &ItemKey::TrackNumber), Some("1"));
        assert_eq!(value_of(&fields, &ItemKey::TrackTotal), Some("2"));
        assert_eq!(value_of(&fields, &ItemKey::Unknown("UPC".into())), Some("0060253780968"));
        assert_eq!(value_of(&fields, &ItemKey::Unknown("TRACKID".into())), Some("1001"));
        assert_eq!(
            value_of(&fields, &ItemKey::Unknown("PERFORMERS".into())),
            Some("John Coltrane, Saxophone\nLee Morgan, Trumpet")
        );
    }

    #[test]
    fn test_missing_values_are_omitted() {
        let album = album();
        let fields = build_tag_fields(&album, &album.track_items()[1]);

        assert_eq!(value_of(&fields, &ItemKey::TrackTitle), Some("Moment's Notice (Alternate Take)"));
        assert_eq!(value_of(&fields, &ItemKey::Isrc), None);
        assert_eq!(value_of(&fields, &ItemKey::Composer), None);
        assert_eq!(value_of(&fields, &ItemKey::CopyrightMessage), None);
        assert!(fields.iter().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn test_custom_fields_are_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01-Blue Train.flac");
        std::fs::write(&path, fixtures::flac_header(16)).unwrap();

        let album = album();
        FlacTagger
            .write_tags(&path, &album, &album.track_items()[0], Some(&b"\xff\xd8 cover"[..]))
            .unwrap();

        let tagged_file = lofty::read_from_path(&path).unwrap();
        let tag = tagged_file.primary_tag().unwrap();
        let text = |key: ItemKey| tag.get_string(&key).map(str::to_string);

        assert_eq!(text(ItemKey::TrackTitle).as_deref(), Some("Blue Train"));
        assert_eq!(text(ItemKey::AlbumArtist).as_deref(), Some("John Coltrane"));
        assert_eq!(text(ItemKey::Unknown("UPC".into())).as_deref(), Some("0060253780968"));
        assert_eq!(text(ItemKey::Unknown("TRACKID".into())).as_deref(), Some("1001"));
        assert_eq!(text(ItemKey::Unknown("ALBUMID".into())).as_deref(), Some("0060253780968"));
        assert_eq!(
            text(ItemKey::Unknown("PERFORMERS".into())).as_deref(),
            Some("John Coltrane, Saxophone\nLee Morgan, Trumpet")
        );
        assert_eq!(tag.pictures().len(), 1);
    }

    #[test]
    fn test_tagging_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.flac");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let album = album();
        let result = FlacTagger.write_tags(&path, &album, &album.track_items()[0], None);
        assert!(matches!(result, Err(DownloadError::Tagging(_))));
    }
}
