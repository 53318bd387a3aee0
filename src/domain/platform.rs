//! Platform capability detection from request headers.
//!
//! Every browser on iOS and iPadOS runs on WebKit, regardless of its brand.
//! Those browsers ignore the download attribute on generated files, so they
//! need a different delivery path than other mobile or desktop browsers.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformFamily {
    WebKitMobile,
    OtherMobile,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    pub family: PlatformFamily,
    /// Whether `Content-Disposition: attachment` reliably lands in the user's files.
    pub honors_attachments: bool,
}

impl PlatformCapabilities {
    pub fn for_family(family: PlatformFamily) -> Self {
        Self {
            family,
            honors_attachments: family != PlatformFamily::WebKitMobile,
        }
    }

    /// Detect capabilities from a `User-Agent` value and an optional
    /// `Sec-CH-UA-Mobile` client hint.
    pub fn detect(user_agent: Option<&str>, mobile_hint: Option<&str>) -> Self {
        let ua = user_agent.unwrap_or_default();

        let family = if ["iPhone", "iPad", "iPod"].iter().any(|m| ua.contains(m)) {
            PlatformFamily::WebKitMobile
        } else if mobile_hint.map(str::trim) == Some("?1")
            || ua.contains("Android")
            || ua.contains("Mobile")
        {
            PlatformFamily::OtherMobile
        } else {
            PlatformFamily::Desktop
        };

        Self::for_family(family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOS_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const IOS_CHROME: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/123.0.6312.52 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Mobile Safari/537.36";
    const DESKTOP_FIREFOX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0";

    #[test]
    fn every_ios_browser_is_webkit_only() {
        for ua in [IOS_SAFARI, IOS_CHROME] {
            let caps = PlatformCapabilities::detect(Some(ua), None);
            assert_eq!(caps.family, PlatformFamily::WebKitMobile);
            assert!(!caps.honors_attachments);
        }
    }

    #[test]
    fn android_is_other_mobile() {
        let caps = PlatformCapabilities::detect(Some(ANDROID_CHROME), None);
        assert_eq!(caps.family, PlatformFamily::OtherMobile);
        assert!(caps.honors_attachments);
    }

    #[test]
    fn client_hint_marks_mobile() {
        let caps = PlatformCapabilities::detect(Some(DESKTOP_FIREFOX), Some("?1"));
        assert_eq!(caps.family, PlatformFamily::OtherMobile);
    }

    #[test]
    fn missing_user_agent_is_desktop() {
        let caps = PlatformCapabilities::detect(None, None);
        assert_eq!(caps.family, PlatformFamily::Desktop);
        assert!(caps.honors_attachments);
    }
}
