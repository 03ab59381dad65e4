use relaytv_core::models::stream::extension;

pub const HLS_PLAYLIST: &str = "application/vnd.apple.mpegurl";
pub const MPEG_TS: &str = "video/mp2t";

/// Guess a media type from the file extension of a URL path
#[must_use]
pub fn guess_content_type(path: &str) -> Option<&'static str> {
    let ct = match extension(path)?.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "ts" | "m2ts" | "mts" => MPEG_TS,
        "m4s" => "video/iso.segment",
        "m3u8" | "m3u" => HLS_PLAYLIST,
        "mpd" => "application/dash+xml",
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "vtt" => "text/vtt",
        _ => return None,
    };
    Some(ct)
}

/// Missing or uninformative upstream content types
#[must_use]
pub fn is_generic(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return true;
    };
    let essence = ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "" | "application/octet-stream" | "binary/octet-stream" | "text/plain"
    )
}

/// Content type to send downstream: upstream's unless it is generic and the
/// path has a recognizable extension.
#[must_use]
pub fn resolve_content_type(upstream: Option<&str>, path: &str) -> Option<String> {
    if is_generic(upstream) {
        if let Some(guess) = guess_content_type(path) {
            return Some(guess.to_string());
        }
    }
    upstream.map(ToString::to_string)
}

#[must_use]
pub fn is_playlist_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("mpegurl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_by_extension() {
        assert_eq!(guess_content_type("/a/movie.MP4"), Some("video/mp4"));
        assert_eq!(guess_content_type("/a/movie.mkv"), Some("video/x-matroska"));
        assert_eq!(guess_content_type("/live/index.m3u8"), Some(HLS_PLAYLIST));
        assert_eq!(guess_content_type("/seg/0001.ts"), Some("video/mp2t"));
        assert_eq!(guess_content_type("/stream"), None);
    }

    #[test]
    fn test_resolve_overrides_only_generic() {
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), "/v.mkv").as_deref(),
            Some("video/x-matroska")
        );
        assert_eq!(
            resolve_content_type(Some("text/plain; charset=utf-8"), "/i.m3u8").as_deref(),
            Some(HLS_PLAYLIST)
        );
        assert_eq!(
            resolve_content_type(None, "/v.mp4").as_deref(),
            Some("video/mp4")
        );
        assert_eq!(
            resolve_content_type(Some("video/webm"), "/v.mp4").as_deref(),
            Some("video/webm")
        );
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), "/blob").as_deref(),
            Some("application/octet-stream")
        );
    }

    #[test]
    fn test_playlist_content_type() {
        assert!(is_playlist_content_type("application/x-mpegURL"));
        assert!(is_playlist_content_type(HLS_PLAYLIST));
        assert!(!is_playlist_content_type("video/mp2t"));
    }
}
