//! Channel endpoint URLs.
//!
//! The token travels as a path segment: `ws(s)://<host>/<channel>/<token>[/<counterpart>]`.

use url::Url;

use taskboard_core::config::ClientConfig;
use taskboard_core::protocol::ChannelKind;
use taskboard_core::{SyncError, SyncResult};

/// Placeholder written instead of the token when a URL is logged.
const REDACTED: &str = "***";

/// Builds socket URLs for one session token.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
    token: String,
}

impl Endpoints {
    pub fn new(base: Url, token: impl Into<String>) -> Self {
        Self {
            base,
            token: token.into(),
        }
    }

    pub fn from_config(config: &ClientConfig, token: impl Into<String>) -> SyncResult<Self> {
        Ok(Self::new(config.ws_base()?, token))
    }

    fn build(&self, kind: ChannelKind, extra: Option<&str>) -> SyncResult<Url> {
        if self.token.is_empty() {
            return Err(SyncError::NotAuthenticated);
        }
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SyncError::InvalidEndpoint(self.base.to_string()))?;
            segments.pop_if_empty().push(kind.path()).push(&self.token);
            if let Some(extra) = extra {
                segments.push(extra);
            }
        }
        Ok(url)
    }

    /// Endpoint of a channel that takes no counterpart.
    pub fn channel(&self, kind: ChannelKind) -> SyncResult<Url> {
        self.build(kind, None)
    }

    /// Chat endpoint. A blank counterpart yields the bare chat endpoint.
    pub fn chat(&self, counterpart: Option<&str>) -> SyncResult<Url> {
        let counterpart = counterpart.map(str::trim).filter(|c| !c.is_empty());
        self.build(ChannelKind::Chat, counterpart)
    }
}

/// Render a channel URL for logs with its token segment masked.
pub fn redacted(url: &Url) -> String {
    let Some(segments) = url.path_segments() else {
        return url.to_string();
    };
    let channel_paths = [
        ChannelKind::Task,
        ChannelKind::Chat,
        ChannelKind::Notification,
        ChannelKind::Global,
        ChannelKind::Dashboard,
    ]
    .map(ChannelKind::path);

    let mut masked = Vec::new();
    let mut mask_next = false;
    for segment in segments {
        if mask_next {
            masked.push(REDACTED);
            mask_next = false;
            continue;
        }
        mask_next = channel_paths.iter().any(|path| *path == segment);
        masked.push(segment);
    }

    let mut out = url.clone();
    out.set_path(&masked.join("/"));
    out.to_string()
}
