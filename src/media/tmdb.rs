use reqwest::Client;
use serde::Deserialize;

use super::{MediaError, MediaResult};
use crate::dao::models::{MediaKind, TriviaItemEntity};

const API_BASE: &str = "https://api.themoviedb.org/3/search";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const SERVICE: &str = "tmdb";

/// Poster lookup by title, year and media kind.
#[derive(Clone)]
pub struct TmdbCoverLookup {
    client: Client,
    api_key: String,
}

impl TmdbCoverLookup {
    /// Build a lookup for `api_key`.
    pub fn new(api_key: String) -> MediaResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(MediaError::ClientBuilder)?;
        Ok(Self { client, api_key })
    }

    /// Poster URL of the best match, if any.
    pub async fn poster(&self, item: &TriviaItemEntity) -> MediaResult<Option<String>> {
        let (path, year_param) = match item.media_kind {
            MediaKind::Movie => ("movie", "year"),
            MediaKind::Tv => ("tv", "first_air_date_year"),
        };

        let mut query = vec![
            ("api_key", self.api_key.clone()),
            ("query", item.work.clone()),
        ];
        if let Some(year) = item.year {
            query.push((year_param, year.to_string()));
        }

        let response = self
            .client
            .get(format!("{API_BASE}/{path}"))
            .query(&query)
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

        Ok(payload.first_poster())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    poster_path: Option<String>,
}

impl SearchResponse {
    fn first_poster(self) -> Option<String> {
        self.results
            .into_iter()
            .find_map(|result| result.poster_path)
            .map(|path| format!("{IMAGE_BASE}{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_result_with_poster() {
        let payload: SearchResponse = serde_json::from_str(
            r#"{"results": [{"poster_path": null}, {"poster_path": "/abc.jpg"}]}"#,
        )
        .unwrap();
        assert_eq!(
            payload.first_poster().as_deref(),
            Some("https://image.tmdb.org/t/p/w500/abc.jpg")
        );
    }
}
