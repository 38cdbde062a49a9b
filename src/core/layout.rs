//! 下载目录布局：`<根目录>/<艺术家>/<专辑>/<NN>-<曲名>.flac`

use std::path::{Path, PathBuf};

use crate::api::models::{Album, Track};
use crate::utils::validator::secure_filename;

pub const COVER_FILE_NAME: &str = "cover.jpg";

pub fn album_dir(download_dir: &Path, album: &Album) -> PathBuf {
    let artist = secure_filename(album.artist_name());
    // 以 '.' 结尾的目录名在部分系统上无法创建
    let title = secure_filename(&album.full_title()).trim_matches('.').trim().to_string();
    download_dir.join(artist).join(title)
}

pub fn track_file_name(track: &Track) -> String {
    format!("{:02}-{}.flac", track.track_number, secure_filename(&track.full_title()))
}

pub fn track_path(download_dir: &Path, album: &Album, track: &Track) -> PathBuf {
    album_dir(download_dir, album).join(track_file_name(track))
}

pub fn cover_path(download_dir: &Path, album: &Album) -> PathBuf {
    album_dir(download_dir, album).join(COVER_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::fixtures::album_json;

    fn album() -> Album {
        serde_json::from_value(album_json()).unwrap()
    }

    #[test]
    fn test_track_path_layout() {
        let album = album();
        let path = track_path(Path::new("/music"), &album, &album.track_items()[1]);
        assert_eq!(
            path,
            PathBuf::from("/music/John Coltrane/Blue Train (Remastered)/02-Moment's Notice (Alternate Take).flac")
        );
        assert_eq!(
            cover_path(Path::new("/music"), &album),
            PathBuf::from("/music/John Coltrane/Blue Train (Remastered)/cover.jpg")
        );
    }

    #[test]
    fn test_unsafe_names_are_sanitized() {
        let mut json = album_json();
        json["artist"]["name"] = "AC/DC".into();
        json["title"] = "Who Made Who?...".into();
        json["version"] = serde_json::Value::Null;
        json["tracks"]["items"][0]["title"] = "Hells Bells: Live".into();
        let album: Album = serde_json::from_value(json).unwrap();

        let path = track_path(Path::new("out"), &album, &album.track_items()[0]);
        assert_eq!(path, PathBuf::from("out/AC_DC/Who Made Who_/01-Hells Bells_ Live.flac"));
    }
}
