//! Ephemeral object URLs for local audio and their ownership.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::LocalAudio;

/// An opaque URL through which a player can address a local binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    /// Wraps a URL string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and revokes object URLs.
///
/// Every URL returned by `create` must be passed to `revoke` exactly once;
/// [`PlaybackResource`] enforces that for the pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectUrlRegistry: Send + Sync {
    /// Binds a new URL to the audio binary.
    fn create(&self, audio: &LocalAudio) -> ObjectUrl;

    /// Releases a URL previously returned by `create`.
    fn revoke(&self, url: &ObjectUrl);
}

/// Process-local registry mapping `blob:` URLs to their audio.
#[derive(Debug, Default)]
pub struct InMemoryObjectUrls {
    live: RwLock<HashMap<ObjectUrl, LocalAudio>>,
}

impl InMemoryObjectUrls {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the audio bound to a live URL.
    #[must_use]
    pub fn resolve(&self, url: &ObjectUrl) -> Option<LocalAudio> {
        self.live.read().get(url).cloned()
    }

    /// Number of URLs created and not yet revoked.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.read().len()
    }
}

impl ObjectUrlRegistry for InMemoryObjectUrls {
    fn create(&self, audio: &LocalAudio) -> ObjectUrl {
        let url = ObjectUrl::new(format!("blob:synesthesia/{}", uuid::Uuid::new_v4()));
        self.live.write().insert(url.clone(), audio.clone());
        url
    }

    fn revoke(&self, url: &ObjectUrl) {
        self.live.write().remove(url);
    }
}

/// Exclusive ownership of the object URL for the active local selection.
///
/// The URL is released exactly once: by an explicit [`release`](Self::release)
/// or, failing that, on drop.
pub struct PlaybackResource {
    url: Option<ObjectUrl>,
    registry: Arc<dyn ObjectUrlRegistry>,
}

impl PlaybackResource {
    /// Creates the URL for `audio` and takes ownership of it.
    pub fn acquire(registry: Arc<dyn ObjectUrlRegistry>, audio: &LocalAudio) -> Self {
        let url = registry.create(audio);
        debug!(url = %url, name = audio.display_name(), "Object URL created");
        Self {
            url: Some(url),
            registry,
        }
    }

    /// The owned URL, if not yet released.
    #[must_use]
    pub fn url(&self) -> Option<&ObjectUrl> {
        self.url.as_ref()
    }

    /// Revokes the URL. Returns the URL if this call released it.
    pub fn release(&mut self) -> Option<ObjectUrl> {
        let url = self.url.take()?;
        self.registry.revoke(&url);
        debug!(url = %url, "Object URL released");
        Some(url)
    }
}

impl Drop for PlaybackResource {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PlaybackResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackResource")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
