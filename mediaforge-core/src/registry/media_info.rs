use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Transport protocol of a media identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Rtmp,
    Rtsp,
    Srt,
    Http,
}

impl Protocol {
    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "rtmp" | "rtmps" => Some(Self::Rtmp),
            "rtsp" | "rtsps" => Some(Self::Rtsp),
            "srt" => Some(Self::Srt),
            "http" | "https" => Some(Self::Http),
            _ => None,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Rtmp => "rtmp",
            Self::Rtsp => "rtsp",
            Self::Srt => "srt",
            Self::Http => "http",
        };
        write!(f, "{s}")
    }
}

/// Parsed media identity: the protocol/app/stream triple used as the
/// registry lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaInfo {
    pub protocol: Protocol,
    pub app: String,
    pub stream: String,
}

impl MediaInfo {
    pub fn new(protocol: Protocol, app: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            protocol,
            app: app.into(),
            stream: stream.into(),
        }
    }

    /// Derive the identity from a push/play url, e.g.
    /// `rtmp://host/live/stream1` → (rtmp, "live", "stream1").
    ///
    /// The first path segment is the application, the remainder (joined) is
    /// the stream name; both must be non-empty.
    pub fn parse(raw_url: &str) -> Result<Self> {
        let url =
            Url::parse(raw_url).map_err(|e| Error::InvalidUrl(format!("{raw_url}: {e}")))?;

        let protocol = Protocol::from_scheme(url.scheme())
            .ok_or_else(|| Error::InvalidUrl(format!("unsupported scheme: {raw_url}")))?;

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        if segments.len() < 2 {
            return Err(Error::InvalidUrl(format!(
                "expected <scheme>://host/app/stream, got: {raw_url}"
            )));
        }

        let app = segments.remove(0).to_string();
        let stream = segments.join("/");

        Ok(Self {
            protocol,
            app,
            stream,
        })
    }
}

impl std::fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.protocol, self.app, self.stream)
    }
}
