use serde::{Deserialize, Deserializer};

/// 接口中的 ID 有时是字符串、有时是数字，统一按字符串处理
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Named {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumImage {
    pub large: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackList {
    #[serde(default)]
    pub items: Vec<Track>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub version: Option<String>,
    #[serde(default)]
    pub artist: Named,
    pub image: Option<AlbumImage>,
    pub url: Option<String>,
    pub release_date_original: Option<String>,
    pub release_type: Option<String>,
    pub upc: Option<String>,
    pub media_count: Option<u32>,
    pub tracks_count: Option<u32>,
    pub genre: Option<Named>,
    pub label: Option<Named>,
    #[serde(default)]
    pub genres_list: Vec<String>,
    pub copyright: Option<String>,
    #[serde(default)]
    pub tracks: TrackList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub version: Option<String>,
    pub track_number: u32,
    pub media_number: Option<u32>,
    pub copyright: Option<String>,
    pub isrc: Option<String>,
    pub performer: Option<Named>,
    pub composer: Option<Named>,
    pub performers: Option<String>,
}

/// `title (version)`，没有版本时只返回标题
pub fn display_title(title: &str, version: Option<&str>) -> String {
    match version.map(str::trim).filter(|v| !v.is_empty()) {
        Some(version) => format!("{} ({})", title.trim(), version),
        None => title.trim().to_string(),
    }
}

impl Album {
    pub fn full_title(&self) -> String {
        display_title(&self.title, self.version.as_deref())
    }

    pub fn artist_name(&self) -> &str {
        &self.artist.name
    }

    /// 最大尺寸的封面地址
    pub fn cover_url(&self) -> Option<String> {
        self.image
            .as_ref()
            .and_then(|image| image.large.as_deref())
            .filter(|url| !url.is_empty())
            .map(|url| url.replace("_600.jpg", "_max.jpg"))
    }

    pub fn track_items(&self) -> &[Track] {
        &self.tracks.items
    }
}

impl Track {
    pub fn full_title(&self) -> String {
        display_title(&self.title, self.version.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUrl {
    pub url: Option<String>,
}
