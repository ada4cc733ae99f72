// In-memory media registry.
//
// Shared lookup/attachment service mapping protocol/app/stream identities to
// live media sources. The registry is externally synchronized from its
// consumers' point of view: lookups and listener attachment only, no
// exclusive ownership is ever handed out.

mod media_info;
mod source;

pub use media_info::{MediaInfo, Protocol};
pub use source::{MediaOriginType, MediaSource, MediaSourceEvent, RecordFlags};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Shared registry of live media sources.
pub struct MediaRegistry {
    sources: DashMap<MediaInfo, Arc<MediaSource>>,
}

impl MediaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }

    /// Register a new source under its identity.
    pub fn register(&self, info: MediaInfo) -> Result<Arc<MediaSource>> {
        let source = MediaSource::new(info.clone());
        match self.sources.entry(info.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(media = %info, "Refusing to register duplicate media source");
                Err(Error::AlreadyExists(info.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&source));
                info!(media = %info, "Media source registered");
                Ok(source)
            }
        }
    }

    /// Non-blocking lookup by identity.
    #[must_use]
    pub fn find(&self, info: &MediaInfo) -> Option<Arc<MediaSource>> {
        self.sources.get(info).map(|entry| Arc::clone(&*entry))
    }

    /// Request closure of a source. The source's event interceptor is
    /// consulted first and may veto; without an interceptor the close is
    /// always accepted. Returns whether the source was removed.
    pub fn close(&self, info: &MediaInfo) -> bool {
        let Some(source) = self.find(info) else {
            return false;
        };

        if let Some(delegate) = source.delegate() {
            if !delegate.on_close(&source) {
                debug!(media = %info, "Close vetoed by source listener");
                return false;
            }
        }

        self.sources.remove(info);
        info!(media = %info, "Media source closed");
        true
    }

    /// Remove a source without consulting its interceptor. Used when the
    /// producing side is already gone.
    pub fn unregister(&self, info: &MediaInfo) -> bool {
        self.sources.remove(info).is_some()
    }

    /// Snapshot of all registered identities, for diagnostics.
    #[must_use]
    pub fn list(&self) -> Vec<MediaInfo> {
        self.sources.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for MediaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
