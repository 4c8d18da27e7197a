use reqwest::Client;
use serde::Deserialize;

use super::{MediaError, MediaResult};
use crate::dao::models::TriviaItemEntity;

const SEARCH_URL: &str = "https://itunes.apple.com/search";
const SERVICE: &str = "itunes";

/// Playable preview found on iTunes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItunesHit {
    /// 30-second preview clip.
    pub preview_url: String,
    /// Album artwork, upscaled to 600x600.
    pub artwork_url: Option<String>,
}

/// Free-text track search against the public iTunes Search API.
#[derive(Clone)]
pub struct ItunesAudioLookup {
    client: Client,
}

impl ItunesAudioLookup {
    /// Build a lookup with its own HTTP client.
    pub fn new() -> MediaResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(MediaError::ClientBuilder)?;
        Ok(Self { client })
    }

    /// Search for the first track matching the item; `None` when nothing playable is found.
    pub async fn search(&self, item: &TriviaItemEntity) -> MediaResult<Option<ItunesHit>> {
        let term = search_term(item);
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("term", term.as_str()), ("media", "music"), ("limit", "1")])
            .send()
            .await
            .map_err(|source| MediaError::Request {
                service: SERVICE,
                source,
            })?;

        if !response.status().is_success() {
            return Err(MediaError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        let payload = response
            .json::<SearchResponse>()
            .await
            .map_err(|source| MediaError::Request {
                service: SERVICE,
                source,
            })?;

        Ok(payload.results.into_iter().next().and_then(TrackResult::into_hit))
    }
}

fn search_term(item: &TriviaItemEntity) -> String {
    format!("{} {} soundtrack", item.title, item.artist)
}

fn upscale_artwork(url: &str) -> String {
    url.replace("100x100", "600x600")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TrackResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackResult {
    preview_url: Option<String>,
    artwork_url100: Option<String>,
}

impl TrackResult {
    fn into_hit(self) -> Option<ItunesHit> {
        let preview_url = self.preview_url.filter(|url| !url.is_empty())?;
        Some(ItunesHit {
            preview_url,
            artwork_url: self.artwork_url100.as_deref().map(upscale_artwork),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::MediaKind;

    #[test]
    fn result_without_preview_is_not_playable() {
        let payload: SearchResponse = serde_json::from_str(
            r#"{"resultCount": 1, "results": [{"artworkUrl100": "https://a/100x100bb.jpg"}]}"#,
        )
        .unwrap();
        let hit = payload.results.into_iter().next().and_then(TrackResult::into_hit);
        assert!(hit.is_none());
    }

    #[test]
    fn artwork_is_upscaled() {
        let payload: SearchResponse = serde_json::from_str(
            r#"{"results": [{"previewUrl": "https://p/clip.m4a", "artworkUrl100": "https://a/100x100bb.jpg"}]}"#,
        )
        .unwrap();
        let hit = payload
            .results
            .into_iter()
            .next()
            .and_then(TrackResult::into_hit)
            .unwrap();
        assert_eq!(hit.preview_url, "https://p/clip.m4a");
        assert_eq!(hit.artwork_url.as_deref(), Some("https://a/600x600bb.jpg"));
    }

    #[test]
    fn term_combines_title_and_artist() {
        let item = TriviaItemEntity {
            id: "x".into(),
            title: "Main Title".into(),
            artist: "John Williams".into(),
            work: "Star Wars".into(),
            year: None,
            media_kind: MediaKind::Movie,
        };
        assert_eq!(search_term(&item), "Main Title John Williams soundtrack");
    }
}
