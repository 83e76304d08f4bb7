//! File name and MIME type inference for downloads.

use reqwest::Url;
use uuid::Uuid;

use drivehub_entity::node::validate_name;

/// Name to register a download under: the last non-empty path segment of
/// the URL, or `<uuid>.file` when there is none or it is not a valid name.
pub fn file_name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .and_then(|segment| validate_name(&segment).ok())
        .unwrap_or_else(|| format!("{}.file", Uuid::new_v4()))
}

/// Media type from a `Content-Type` header value, without parameters.
/// `application/octet-stream` carries no information and yields `None`.
pub fn mime_from_content_type(header: &str) -> Option<String> {
    let mime = header.split(';').next()?.trim().to_ascii_lowercase();
    if mime.is_empty() || mime == "application/octet-stream" || !mime.contains('/') {
        None
    } else {
        Some(mime)
    }
}

/// Media type guessed from a file name's extension.
pub fn guess_mime(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "md" => "text/markdown",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "iso" => "application/x-iso9660-image",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}

/// Check that a download URL is absolute http(s).
pub fn is_downloadable(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}
