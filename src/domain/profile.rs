//! Normalized profile data bound to a card.

use serde::Serialize;

use super::handle::Handle;

/// Bio printed when the upstream profile has none or could not be fetched.
pub const DEFAULT_BIO: &str = "Stay Ritualized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub handle: Handle,
    pub display_name: String,
    /// Relay path (`/api/img?url=...`) for the avatar, when one was found.
    pub avatar_url: Option<String>,
    pub bio: String,
    pub follower_count: Option<u64>,
    pub following_count: Option<u64>,
    pub post_count: Option<u64>,
}

impl ProfileRecord {
    /// Minimal record used when profile enrichment is unavailable.
    pub fn handle_only(handle: Handle) -> Self {
        Self {
            display_name: handle.as_str().to_string(),
            handle,
            avatar_url: None,
            bio: DEFAULT_BIO.to_string(),
            follower_count: None,
            following_count: None,
            post_count: None,
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.avatar_url.is_some()
            || self.follower_count.is_some()
            || self.following_count.is_some()
            || self.post_count.is_some()
            || self.bio != DEFAULT_BIO
            || self.display_name != self.handle.as_str()
    }
}
