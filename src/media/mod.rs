//! Playable media lookups for trivia items.

mod itunes;
mod tmdb;

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::dao::models::TriviaItemEntity;

pub use itunes::{ItunesAudioLookup, ItunesHit};
pub use tmdb::TmdbCoverLookup;

/// Result alias for individual lookups.
pub type MediaResult<T> = Result<T, MediaError>;

/// Transport failures of a lookup. Not-found is `Ok(None)`, never an error.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Building the HTTP client failed.
    #[error("failed to build media client")]
    ClientBuilder(#[source] reqwest::Error),
    /// The request failed or the body could not be decoded.
    #[error("media request to {service} failed")]
    Request {
        /// Service name.
        service: &'static str,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The service replied with a non-success status.
    #[error("{service} replied with status {status}")]
    Status {
        /// Service name.
        service: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// The lookup did not finish in time.
    #[error("{service} lookup timed out after {limit:?}")]
    Timeout {
        /// Service name.
        service: &'static str,
        /// Applied bound.
        limit: Duration,
    },
}

/// Media attached to the item in play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Playable preview clip.
    pub preview_audio_url: String,
    /// Best-effort cover image.
    pub cover_image_url: Option<String>,
}

/// Maps a trivia item to playable media, or `None` when it cannot be played.
pub trait MediaResolver: Send + Sync {
    /// Resolve media for `item`. Implementations must not fail for ordinary not-found cases.
    fn resolve(&self, item: &TriviaItemEntity) -> BoxFuture<'static, Option<ResolvedMedia>>;
}

/// Audio from iTunes (mandatory), cover from TMDB when configured, else iTunes artwork.
#[derive(Clone)]
pub struct CompositeMediaResolver {
    audio: ItunesAudioLookup,
    cover: Option<TmdbCoverLookup>,
    limit: Duration,
}

impl CompositeMediaResolver {
    /// Wire the lookups together, bounding each one by `limit`.
    pub fn new(audio: ItunesAudioLookup, cover: Option<TmdbCoverLookup>, limit: Duration) -> Self {
        Self { audio, cover, limit }
    }

    /// Build the default resolver from an optional TMDB key.
    pub fn from_keys(tmdb_api_key: Option<String>, limit: Duration) -> MediaResult<Arc<Self>> {
        let audio = ItunesAudioLookup::new()?;
        let cover = tmdb_api_key.map(TmdbCoverLookup::new).transpose()?;
        Ok(Arc::new(Self::new(audio, cover, limit)))
    }

    async fn resolve_owned(self, item: TriviaItemEntity) -> Option<ResolvedMedia> {
        let hit = match bounded("itunes", self.limit, self.audio.search(&item)).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                debug!(item = %item.id, "no playable preview found");
                return None;
            }
            Err(err) => {
                warn!(item = %item.id, error = %err, "audio lookup failed");
                return None;
            }
        };

        let mut cover_image_url = None;
        if let Some(cover) = &self.cover {
            match bounded("tmdb", self.limit, cover.poster(&item)).await {
                Ok(found) => cover_image_url = found,
                Err(err) => warn!(item = %item.id, error = %err, "cover lookup failed"),
            }
        }

        Some(ResolvedMedia {
            preview_audio_url: hit.preview_url,
            cover_image_url: cover_image_url.or(hit.artwork_url),
        })
    }
}

impl MediaResolver for CompositeMediaResolver {
    fn resolve(&self, item: &TriviaItemEntity) -> BoxFuture<'static, Option<ResolvedMedia>> {
        let resolver = self.clone();
        let item = item.clone();
        Box::pin(resolver.resolve_owned(item))
    }
}

async fn bounded<T>(
    service: &'static str,
    limit: Duration,
    lookup: impl Future<Output = MediaResult<T>>,
) -> MediaResult<T> {
    timeout(limit, lookup)
        .await
        .map_err(|_| MediaError::Timeout { service, limit })?
}
