//! Profile lookup and normalization.
//!
//! Upstream payloads vary in shape, so every field is read through an ordered
//! list of candidate keys. Lookups never fail the caller: any upstream problem
//! degrades to a handle-only record.

use std::sync::Arc;

use metrics::counter;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{
    error::DomainError,
    handle::Handle,
    profile::{DEFAULT_BIO, ProfileRecord},
};

use super::{
    relay::relay_path,
    upstream::{ProfileSource, UpstreamError},
};

const METRIC_PROFILE_FALLBACK_TOTAL: &str = "ritual_profile_fallback_total";

const NAME_KEYS: &[&str] = &["name", "display_name"];
const AVATAR_KEYS: &[&str] = &[
    "avatar_url",
    "profile_image_url_https",
    "profile_image_url",
    "avatar",
];
const BIO_KEYS: &[&str] = &["description", "bio"];
const FOLLOWER_KEYS: &[&str] = &["followers", "followers_count"];
const FOLLOWING_KEYS: &[&str] = &["following", "friends_count", "following_count"];
const POST_KEYS: &[&str] = &["tweets", "statuses_count", "posts_count"];

pub struct ProfileResolver {
    source: Arc<dyn ProfileSource>,
}

impl ProfileResolver {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }

    /// Normalize raw input and resolve it. Only an empty handle is an error.
    pub async fn resolve(&self, raw_handle: &str) -> Result<ProfileRecord, DomainError> {
        let handle = Handle::parse(raw_handle)?;
        Ok(self.resolve_handle(handle).await)
    }

    pub async fn resolve_handle(&self, handle: Handle) -> ProfileRecord {
        let payload = match self.source.lookup(&handle).await {
            Ok(payload) => payload,
            Err(err) => return degraded(handle, fallback_reason(&err), &err),
        };

        match normalize(handle.clone(), &payload) {
            Some(record) => {
                debug!(
                    target = "ritual_cards::profile",
                    handle = %record.handle,
                    has_avatar = record.avatar_url.is_some(),
                    "profile resolved"
                );
                record
            }
            None => degraded(
                handle,
                "malformed",
                &UpstreamError::malformed("profile payload is not a JSON object"),
            ),
        }
    }
}

fn fallback_reason(err: &UpstreamError) -> &'static str {
    match err {
        UpstreamError::Transport(_) => "transport",
        UpstreamError::Status(_) => "status",
        UpstreamError::Malformed(_) => "malformed",
    }
}

fn degraded(handle: Handle, reason: &'static str, err: &UpstreamError) -> ProfileRecord {
    warn!(
        target = "ritual_cards::profile",
        handle = %handle,
        reason,
        error = %err,
        "profile lookup failed; using handle-only record"
    );
    counter!(METRIC_PROFILE_FALLBACK_TOTAL, "reason" => reason).increment(1);
    ProfileRecord::handle_only(handle)
}

/// Map an upstream payload onto a [`ProfileRecord`].
///
/// Returns `None` when the payload is not a JSON object.
pub fn normalize(handle: Handle, payload: &Value) -> Option<ProfileRecord> {
    let root = payload.as_object()?;
    let fields = root
        .get("user")
        .and_then(Value::as_object)
        .unwrap_or(root);

    let display_name =
        first_text(fields, NAME_KEYS).unwrap_or_else(|| handle.as_str().to_string());
    let avatar_url = first_text(fields, AVATAR_KEYS)
        .filter(|url| is_web_url(url))
        .map(|url| relay_path(&url));
    let bio = first_text(fields, BIO_KEYS).unwrap_or_else(|| DEFAULT_BIO.to_string());

    Some(ProfileRecord {
        handle,
        display_name,
        avatar_url,
        bio,
        follower_count: first_count(fields, FOLLOWER_KEYS),
        following_count: first_count(fields, FOLLOWING_KEYS),
        post_count: first_count(fields, POST_KEYS),
    })
}

fn first_text(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn first_count(fields: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(lenient_count)
}

/// Counts arrive as numbers or numeric strings depending on the upstream.
fn lenient_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn is_web_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;

    struct FixedSource(Result<Value, StatusCode>);

    #[async_trait]
    impl ProfileSource for FixedSource {
        async fn lookup(&self, _handle: &Handle) -> Result<Value, UpstreamError> {
            self.0.clone().map_err(UpstreamError::Status)
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl ProfileSource for PanickingSource {
        async fn lookup(&self, _handle: &Handle) -> Result<Value, UpstreamError> {
            panic!("empty handles must not reach the network");
        }
    }

    fn handle(raw: &str) -> Handle {
        Handle::parse(raw).unwrap()
    }

    #[test]
    fn reads_nested_user_object() {
        let payload = json!({
            "code": 200,
            "user": {
                "name": "Example Person",
                "avatar_url": "https://pbs.twimg.com/profile_images/1/a_400x400.jpg",
                "description": "ritual enjoyer",
                "followers": 1200,
                "following": "45",
                "tweets": 3_400_000
            }
        });

        let record = normalize(handle("Example"), &payload).unwrap();
        assert_eq!(record.display_name, "Example Person");
        assert_eq!(
            record.avatar_url.as_deref(),
            Some("/api/img?url=https%3A%2F%2Fpbs.twimg.com%2Fprofile_images%2F1%2Fa_400x400.jpg")
        );
        assert_eq!(record.bio, "ritual enjoyer");
        assert_eq!(record.follower_count, Some(1200));
        assert_eq!(record.following_count, Some(45));
        assert_eq!(record.post_count, Some(3_400_000));
    }

    #[test]
    fn falls_through_alternate_keys_at_top_level() {
        let payload = json!({
            "display_name": "",
            "profile_image_url_https": "https://pbs.twimg.com/b_normal.jpg",
            "profile_image_url": "http://pbs.twimg.com/b.jpg",
            "bio": "second choice",
            "followers_count": "1,024",
            "friends_count": 7,
            "statuses_count": null,
            "posts_count": 9
        });

        let record = normalize(handle("alt"), &payload).unwrap();
        assert_eq!(record.display_name, "alt");
        assert!(
            record
                .avatar_url
                .as_deref()
                .is_some_and(|path| path.ends_with("b_normal.jpg"))
        );
        assert_eq!(record.bio, "second choice");
        assert_eq!(record.follower_count, Some(1024));
        assert_eq!(record.following_count, Some(7));
        assert_eq!(record.post_count, Some(9));
    }

    #[test]
    fn non_web_avatars_and_junk_counts_are_dropped() {
        let payload = json!({
            "avatar_url": "javascript:alert(1)",
            "followers": "many",
            "following": {"n": 1},
            "tweets": -4
        });

        let record = normalize(handle("junk"), &payload).unwrap();
        assert!(record.avatar_url.is_none());
        assert!(record.follower_count.is_none());
        assert!(record.following_count.is_none());
        assert!(record.post_count.is_none());
        assert_eq!(record.bio, DEFAULT_BIO);
    }

    #[test]
    fn non_object_payload_is_malformed() {
        assert!(normalize(handle("x"), &json!([1, 2, 3])).is_none());
        assert!(normalize(handle("x"), &json!("nope")).is_none());
    }

    #[tokio::test]
    async fn upstream_failure_degrades_to_handle_only() {
        let resolver = ProfileResolver::new(Arc::new(FixedSource(Err(StatusCode::NOT_FOUND))));
        let record = resolver.resolve(" @Ghost ").await.unwrap();

        assert_eq!(record, ProfileRecord::handle_only(handle("Ghost")));
    }

    #[tokio::test]
    async fn malformed_payload_degrades_to_handle_only() {
        let resolver = ProfileResolver::new(Arc::new(FixedSource(Ok(json!(null)))));
        let record = resolver.resolve("ghost").await.unwrap();

        assert!(!record.is_enriched());
    }

    #[tokio::test]
    async fn empty_handle_is_rejected_before_lookup() {
        let resolver = ProfileResolver::new(Arc::new(PanickingSource));
        assert_eq!(resolver.resolve(" @ ").await, Err(DomainError::EmptyHandle));
    }
}
