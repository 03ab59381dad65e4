use std::fmt;
use std::str::FromStr;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Characters left unescaped in a query value (RFC 3986 unreserved set)
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// How the target of a gateway call is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Finite, seekable asset
    #[default]
    Vod,
    /// Open-ended stream
    Live,
}

impl StreamMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vod => "vod",
            Self::Live => "live",
        }
    }

    /// Infer the mode from a catalog content type such as `live` or `movie`
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type.to_ascii_lowercase().as_str() {
            "live" | "channel" | "tv" => Self::Live,
            _ => Self::Vod,
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vod" => Ok(Self::Vod),
            "live" => Ok(Self::Live),
            other => Err(Error::InvalidInput(format!("unknown stream mode: {other}"))),
        }
    }
}

/// One gateway call: what to fetch and how to interpret it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub target_url: Url,
    pub mode: Option<StreamMode>,
    pub want_raw: bool,
}

impl StreamRequest {
    #[must_use]
    pub const fn new(target_url: Url, mode: Option<StreamMode>, want_raw: bool) -> Self {
        Self {
            target_url,
            mode,
            want_raw,
        }
    }

    /// Build from the raw query values of a gateway call
    pub fn from_query(url: Option<&str>, mode: Option<&str>, raw: Option<&str>) -> Result<Self> {
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::InvalidInput("missing url parameter".to_string()))?;
        let target_url = Url::parse(url)?;
        if !matches!(target_url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme: {}",
                target_url.scheme()
            )));
        }
        let mode = match mode.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => Some(m.parse()?),
            None => None,
        };
        Ok(Self::new(target_url, mode, raw.is_some_and(parse_flag)))
    }

    /// Mode used when synthesizing; VOD unless the caller said otherwise
    #[must_use]
    pub fn effective_mode(&self) -> StreamMode {
        self.mode.unwrap_or_default()
    }

    /// Whether the gateway should answer with a synthesized manifest
    /// instead of piping the upstream body.
    #[must_use]
    pub fn should_synthesize(&self) -> bool {
        !self.want_raw && (self.mode.is_some() || is_bare_segment(self.target_url.path()))
    }
}

/// Parse a boolean query flag (`1`, `true`, `yes`)
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// A raw transport-stream file with no playlist around it
#[must_use]
pub fn is_bare_segment(path: &str) -> bool {
    has_extension(path, &["ts", "m2ts", "mts"])
}

/// An HLS playlist path
#[must_use]
pub fn is_playlist(path: &str) -> bool {
    has_extension(path, &["m3u8", "m3u"])
}

/// Lower-case file extension of the last path segment
#[must_use]
pub fn extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

fn has_extension(path: &str, exts: &[&str]) -> bool {
    extension(path).is_some_and(|ext| exts.contains(&ext.as_str()))
}

/// Percent-encode a value for use inside a query string
#[must_use]
pub fn encode_query_value(input: &str) -> String {
    utf8_percent_encode(input, QUERY_VALUE).to_string()
}

/// Build a gateway path such as `/relay?url=<encoded>&mode=live&raw=true`
#[must_use]
pub fn relay_path(base: &str, target: &str, mode: Option<StreamMode>, raw: bool) -> String {
    let mut path = format!("{base}?url={}", encode_query_value(target));
    if let Some(mode) = mode {
        path.push_str("&mode=");
        path.push_str(mode.as_str());
    }
    if raw {
        path.push_str("&raw=true");
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_requires_url() {
        assert!(matches!(
            StreamRequest::from_query(None, None, None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            StreamRequest::from_query(Some("  "), None, None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            StreamRequest::from_query(Some("not a url"), None, None),
            Err(Error::InvalidUrl(_))
        ));
        assert!(matches!(
            StreamRequest::from_query(Some("ftp://origin/video.ts"), None, None),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_from_query_parses_mode_and_raw() {
        let req =
            StreamRequest::from_query(Some("http://origin/live"), Some("LIVE"), Some("1")).unwrap();
        assert_eq!(req.mode, Some(StreamMode::Live));
        assert!(req.want_raw);

        assert!(StreamRequest::from_query(Some("http://origin/a"), Some("dvr"), None).is_err());
    }

    #[test]
    fn test_should_synthesize() {
        let bare = StreamRequest::from_query(Some("http://origin/video.ts"), None, None).unwrap();
        assert!(bare.should_synthesize());
        assert_eq!(bare.effective_mode(), StreamMode::Vod);

        let raw = StreamRequest::from_query(Some("http://origin/video.ts"), None, Some("true"))
            .unwrap();
        assert!(!raw.should_synthesize());

        let mp4 = StreamRequest::from_query(Some("http://origin/movie.mp4"), None, None).unwrap();
        assert!(!mp4.should_synthesize());

        let live =
            StreamRequest::from_query(Some("http://origin/channel/7"), Some("live"), None).unwrap();
        assert!(live.should_synthesize());
    }

    #[test]
    fn test_extension_helpers() {
        assert!(is_bare_segment("/a/b/VIDEO.TS"));
        assert!(!is_bare_segment("/a/b.ts/index"));
        assert!(is_playlist("/hls/index.m3u8"));
        assert_eq!(extension("/movie.final.mkv"), Some("mkv".to_string()));
        assert_eq!(extension("/noext"), None);
    }

    #[test]
    fn test_relay_path() {
        assert_eq!(
            relay_path("/relay", "http://origin/video.ts", None, true),
            "/relay?url=http%3A%2F%2Forigin%2Fvideo.ts&raw=true"
        );
        assert_eq!(
            relay_path("/relay", "http://o/x?a=1&b=2", Some(StreamMode::Live), false),
            "/relay?url=http%3A%2F%2Fo%2Fx%3Fa%3D1%26b%3D2&mode=live"
        );
    }

    #[test]
    fn test_mode_from_content_type() {
        assert_eq!(StreamMode::from_content_type("live"), StreamMode::Live);
        assert_eq!(StreamMode::from_content_type("movie"), StreamMode::Vod);
    }
}
