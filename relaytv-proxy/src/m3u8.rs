//! HLS playlist generation and rewriting
//!
//! Pure string functions. No I/O, no async.

use std::fmt::Write;

use relaytv_core::models::stream::is_playlist;
use relaytv_core::models::{relay_path, StreamMode};
use url::Url;

/// Declared duration of the single segment of a VOD manifest (4 hours)
pub const VOD_SEGMENT_SECONDS: u64 = 14_400;

/// Declared duration of the single segment of a live manifest. Large enough
/// that the player never reaches the end of the segment.
pub const LIVE_SEGMENT_SECONDS: u64 = 999_999;

/// Wrap one raw media resource in a single-segment HLS playlist.
///
/// The segment points back at the gateway with `raw=true`, so fetching it
/// pipes the upstream bytes instead of synthesizing again. Same inputs
/// always give the same bytes.
#[must_use]
pub fn synthesize_manifest(target: &str, mode: StreamMode, gateway_path: &str) -> String {
    let duration = match mode {
        StreamMode::Vod => VOD_SEGMENT_SECONDS,
        StreamMode::Live => LIVE_SEGMENT_SECONDS,
    };
    let segment = relay_path(gateway_path, target, None, true);

    let mut m3u8 = String::with_capacity(256 + segment.len());
    m3u8.push_str("#EXTM3U\n");
    m3u8.push_str("#EXT-X-VERSION:3\n");
    let _ = writeln!(m3u8, "#EXT-X-TARGETDURATION:{duration}");
    m3u8.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
    if mode == StreamMode::Vod {
        m3u8.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");
    }
    let _ = writeln!(m3u8, "#EXTINF:{duration}.0,");
    m3u8.push_str(&segment);
    m3u8.push('\n');
    if mode == StreamMode::Vod {
        m3u8.push_str("#EXT-X-ENDLIST\n");
    }
    m3u8
}

/// Rewrite every URI of an upstream playlist so it routes through the
/// gateway.
///
/// URIs are resolved against `base` (the final upstream URL after
/// redirects). Nested playlists keep going through playlist handling;
/// everything else (segments, keys, init sections) is fetched raw.
#[must_use]
pub fn rewrite_playlist(m3u8: &str, base: &Url, gateway_path: &str) -> String {
    let mut output = String::with_capacity(m3u8.len() * 2);
    let mut next_is_variant = false;

    for line in m3u8.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            let nested = trimmed.starts_with("#EXT-X-MEDIA:")
                || trimmed.starts_with("#EXT-X-I-FRAME-STREAM-INF:");
            output.push_str(&rewrite_uri_attributes(line, base, gateway_path, nested));
            if trimmed.starts_with("#EXT-X-STREAM-INF:") {
                next_is_variant = true;
            }
        } else if trimmed.is_empty() {
            output.push_str(line);
        } else {
            output.push_str(&route_uri(trimmed, base, gateway_path, next_is_variant));
            next_is_variant = false;
        }
        output.push('\n');
    }

    output
}

fn route_uri(uri: &str, base: &Url, gateway_path: &str, nested: bool) -> String {
    let Ok(absolute) = base.join(uri) else {
        return uri.to_string();
    };
    let raw = !(nested || is_playlist(absolute.path()));
    relay_path(gateway_path, absolute.as_str(), None, raw)
}

/// Rewrite any `URI="..."` values found in a tag line
fn rewrite_uri_attributes(line: &str, base: &Url, gateway_path: &str, nested: bool) -> String {
    const PATTERN: &str = "URI=\"";
    let mut result = String::with_capacity(line.len());
    let mut remaining = line;

    while let Some(start) = remaining.find(PATTERN) {
        result.push_str(&remaining[..start + PATTERN.len()]);
        remaining = &remaining[start + PATTERN.len()..];

        if let Some(end) = remaining.find('"') {
            result.push_str(&route_uri(&remaining[..end], base, gateway_path, nested));
            result.push('"');
            remaining = &remaining[end + 1..];
        } else {
            result.push_str(remaining);
            remaining = "";
        }
    }

    result.push_str(remaining);
    result
}

const PLAYLIST_TAG: &[u8] = b"#EXTM3U";

/// Body with any UTF-8 BOM and leading whitespace removed
fn playlist_start(body: &[u8]) -> &[u8] {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    &body[start..]
}

/// Whether a body prefix is still consistent with an HLS playlist
#[must_use]
pub fn may_be_playlist(prefix: &[u8]) -> bool {
    let head = playlist_start(prefix);
    let n = head.len().min(PLAYLIST_TAG.len());
    head[..n] == PLAYLIST_TAG[..n]
}

/// Whether a complete body is an HLS playlist
#[must_use]
pub fn is_playlist_body(body: &[u8]) -> bool {
    playlist_start(body).starts_with(PLAYLIST_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vod_manifest_shape() {
        let m3u8 = synthesize_manifest("http://origin/video.ts", StreamMode::Vod, "/relay");
        assert_eq!(
            m3u8,
            "#EXTM3U\n\
             #EXT-X-VERSION:3\n\
             #EXT-X-TARGETDURATION:14400\n\
             #EXT-X-MEDIA-SEQUENCE:0\n\
             #EXT-X-PLAYLIST-TYPE:VOD\n\
             #EXTINF:14400.0,\n\
             /relay?url=http%3A%2F%2Forigin%2Fvideo.ts&raw=true\n\
             #EXT-X-ENDLIST\n"
        );
    }

    #[test]
    fn test_live_manifest_has_no_endlist() {
        let m3u8 = synthesize_manifest("http://origin/ch/7", StreamMode::Live, "/relay");
        assert!(!m3u8.contains("#EXT-X-ENDLIST"));
        assert!(!m3u8.contains("PLAYLIST-TYPE"));
        assert!(m3u8.contains("#EXT-X-TARGETDURATION:999999\n"));
        assert_eq!(m3u8.matches("#EXTINF:").count(), 1);
        assert!(m3u8.contains("&raw=true\n"));
    }

    #[test]
    fn test_target_duration_covers_segment() {
        for mode in [StreamMode::Vod, StreamMode::Live] {
            let m3u8 = synthesize_manifest("http://o/a.ts", mode, "/relay");
            let target: f64 = m3u8
                .lines()
                .find_map(|l| l.strip_prefix("#EXT-X-TARGETDURATION:"))
                .and_then(|v| v.parse().ok())
                .unwrap();
            let segment: f64 = m3u8
                .lines()
                .find_map(|l| l.strip_prefix("#EXTINF:"))
                .and_then(|v| v.trim_end_matches(',').parse().ok())
                .unwrap();
            assert!(target >= segment);
        }
    }

    #[test]
    fn test_manifest_is_deterministic() {
        let a = synthesize_manifest("http://o/a.ts?x=1", StreamMode::Vod, "/relay");
        let b = synthesize_manifest("http://o/a.ts?x=1", StreamMode::Vod, "/relay");
        assert_eq!(a, b);
    }

    #[test]
    fn test_rewrite_media_playlist() {
        let base = Url::parse("http://origin/hls/index.m3u8").unwrap();
        let input = "#EXTM3U\n\
                     #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                     #EXTINF:4.0,\n\
                     seg0.ts\n\
                     #EXTINF:4.0,\n\
                     https://cdn.example/seg1.ts\n\
                     #EXT-X-ENDLIST";

        let output = rewrite_playlist(input, &base, "/relay");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[1],
            "#EXT-X-KEY:METHOD=AES-128,URI=\"/relay?url=http%3A%2F%2Forigin%2Fhls%2Fkey.bin&raw=true\""
        );
        assert_eq!(lines[3], "/relay?url=http%3A%2F%2Forigin%2Fhls%2Fseg0.ts&raw=true");
        assert_eq!(lines[5], "/relay?url=https%3A%2F%2Fcdn.example%2Fseg1.ts&raw=true");
        assert_eq!(lines[6], "#EXT-X-ENDLIST");
    }

    #[test]
    fn test_rewrite_master_playlist() {
        let base = Url::parse("http://origin/live/master.m3u8").unwrap();
        let input = "#EXTM3U\n\
                     #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",URI=\"audio/en\"\n\
                     #EXT-X-STREAM-INF:BANDWIDTH=800000\n\
                     low/stream\n";

        let output = rewrite_playlist(input, &base, "/relay");
        assert!(output.contains("URI=\"/relay?url=http%3A%2F%2Forigin%2Flive%2Faudio%2Fen\""));
        assert!(output.contains("\n/relay?url=http%3A%2F%2Forigin%2Flive%2Flow%2Fstream\n"));
        assert!(!output.contains("raw=true"));
    }

    #[test]
    fn test_playlist_sniffing() {
        assert!(may_be_playlist(b""));
        assert!(may_be_playlist(b"#EXT"));
        assert!(may_be_playlist(b"\xEF\xBB\xBF\r\n#EXTM3U\n#EXTINF"));
        assert!(!may_be_playlist(&[0x47, 0x40, 0x00, 0x10]));
        assert!(!may_be_playlist(b"<html>"));

        assert!(is_playlist_body(b"#EXTM3U\n#EXT-X-ENDLIST\n"));
        assert!(!is_playlist_body(b"#EXT"));
        assert!(!is_playlist_body(b""));
    }
}
