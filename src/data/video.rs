use serde::{Deserialize, Serialize};

/// A music video found for a song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub url: String,
    pub source: String,
}

impl VideoResult {
    /// Build a result for a YouTube video id
    pub fn youtube(id: &str, title: &str, channel: &str, thumbnail: Option<String>) -> Self {
        VideoResult {
            id: id.to_string(),
            title: title.to_string(),
            channel: channel.to_string(),
            thumbnail,
            url: format!("https://www.youtube.com/watch?v={}", id),
            source: "youtube".to_string(),
        }
    }
}
