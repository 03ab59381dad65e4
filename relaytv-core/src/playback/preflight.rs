//! URL correction applied before the first source attempt

use url::Url;

/// Result of pre-flight correction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedUrl {
    /// Direct upstream URL
    pub target: String,
    /// The input already pointed at the gateway (or a legacy proxy path)
    pub via_gateway: bool,
}

/// Normalize a candidate URL.
///
/// Scheme-relative URLs inherit the page scheme. Proxy-relative URLs using
/// the gateway path or one of the historical proxy paths are unwrapped to
/// their `url` parameter and flagged as gateway-routed, so later ladder
/// steps rebuild the canonical gateway shape from the direct target.
#[must_use]
pub fn correct_url(
    input: &str,
    gateway_path: &str,
    legacy_paths: &[String],
    page_origin: Option<&Url>,
) -> CorrectedUrl {
    let trimmed = input.trim();

    let absolute = if let Some(rest) = trimmed.strip_prefix("//") {
        let scheme = page_origin.map_or("https", Url::scheme);
        format!("{scheme}://{rest}")
    } else {
        trimmed.to_string()
    };

    if let Some(inner) = unwrap_proxy_path(&absolute, gateway_path, legacy_paths, page_origin) {
        return CorrectedUrl {
            target: inner,
            via_gateway: true,
        };
    }

    CorrectedUrl {
        target: absolute,
        via_gateway: false,
    }
}

fn unwrap_proxy_path(
    input: &str,
    gateway_path: &str,
    legacy_paths: &[String],
    page_origin: Option<&Url>,
) -> Option<String> {
    let parsed = if input.starts_with('/') {
        // Any base works for a path-only input; only path and query are read
        Url::parse("http://localhost/").ok()?.join(input).ok()?
    } else {
        let parsed = Url::parse(input).ok()?;
        let same_origin = page_origin.is_some_and(|page| page.origin() == parsed.origin());
        if !same_origin {
            return None;
        }
        parsed
    };

    let path = parsed.path().trim_end_matches('/');
    let known = path == gateway_path.trim_end_matches('/')
        || legacy_paths
            .iter()
            .any(|legacy| path == legacy.trim_end_matches('/'));
    if !known {
        return None;
    }

    parsed
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A secure page loading an insecure resource is blocked by the browser
#[must_use]
pub fn is_mixed_content(page_origin: Option<&Url>, target: &str) -> bool {
    let page_secure = page_origin.is_some_and(|page| page.scheme() == "https");
    page_secure && Url::parse(target).is_ok_and(|t| t.scheme() == "http")
}

/// Path of an absolute URL, or the input itself when it does not parse
#[must_use]
pub fn path_of(target: &str) -> String {
    Url::parse(target).map_or_else(
        |_| {
            target
                .split(['?', '#'])
                .next()
                .unwrap_or(target)
                .to_string()
        },
        |u| u.path().to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy() -> Vec<String> {
        vec!["/proxy".to_string(), "/api/proxy".to_string()]
    }

    #[test]
    fn test_plain_url_unchanged() {
        let corrected = correct_url("  http://origin/a.m3u8 ", "/relay", &legacy(), None);
        assert_eq!(corrected.target, "http://origin/a.m3u8");
        assert!(!corrected.via_gateway);
    }

    #[test]
    fn test_scheme_relative_uses_page_scheme() {
        let page = Url::parse("https://app.example").unwrap();
        let corrected = correct_url("//cdn.example/v.mp4", "/relay", &legacy(), Some(&page));
        assert_eq!(corrected.target, "https://cdn.example/v.mp4");
    }

    #[test]
    fn test_legacy_proxy_path_unwrapped() {
        let corrected = correct_url(
            "/api/proxy?url=http%3A%2F%2Forigin%2Fvideo.ts",
            "/relay",
            &legacy(),
            None,
        );
        assert_eq!(corrected.target, "http://origin/video.ts");
        assert!(corrected.via_gateway);
    }

    #[test]
    fn test_same_origin_absolute_proxy_url_unwrapped() {
        let page = Url::parse("https://app.example").unwrap();
        let corrected = correct_url(
            "https://app.example/relay?url=http%3A%2F%2Forigin%2Fa.m3u8",
            "/relay",
            &legacy(),
            Some(&page),
        );
        assert_eq!(corrected.target, "http://origin/a.m3u8");
        assert!(corrected.via_gateway);

        let foreign = correct_url(
            "https://other.example/relay?url=http%3A%2F%2Forigin%2Fa.m3u8",
            "/relay",
            &legacy(),
            Some(&page),
        );
        assert!(!foreign.via_gateway);
    }

    #[test]
    fn test_unknown_path_not_unwrapped() {
        let corrected = correct_url("/files?url=http://x/a.mp4", "/relay", &legacy(), None);
        assert!(!corrected.via_gateway);
    }

    #[test]
    fn test_mixed_content() {
        let secure = Url::parse("https://app.example").unwrap();
        let plain = Url::parse("http://app.example").unwrap();
        assert!(is_mixed_content(Some(&secure), "http://origin/a.m3u8"));
        assert!(!is_mixed_content(Some(&secure), "https://origin/a.m3u8"));
        assert!(!is_mixed_content(Some(&plain), "http://origin/a.m3u8"));
        assert!(!is_mixed_content(None, "http://origin/a.m3u8"));
    }

    #[test]
    fn test_path_of() {
        assert_eq!(path_of("http://o/a/b.ts?x=1"), "/a/b.ts");
        assert_eq!(path_of("/relay?url=x"), "/relay");
    }
}
