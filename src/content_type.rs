//! Content-Type derivation and header completion for uploads.

use std::collections::BTreeMap;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Extension → MIME type
const MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("xml", "text/xml"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("webmanifest", "application/manifest+json"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("wasm", "application/wasm"),
];

/// MIME type for a path, judged by its extension.
pub fn mime_type(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return DEFAULT_MIME_TYPE;
    };
    let extension = extension.to_ascii_lowercase();

    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}

/// Text, JSON and JavaScript payloads are served as UTF-8.
fn wants_charset(mime: &str) -> bool {
    mime.starts_with("text/") || mime.ends_with("json") || mime.ends_with("javascript")
}

/// Full Content-Type header value for a path.
pub fn content_type(path: &str) -> String {
    let mime = mime_type(path);
    if wants_charset(mime) {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

fn has_header(headers: &BTreeMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.eq_ignore_ascii_case(name))
}

/// Merge default and per-file headers, then fill in Content-Type and Content-Length
/// unless the caller already set them (header names compare case-insensitively).
pub fn upload_headers(
    defaults: &BTreeMap<String, String>,
    per_file: &BTreeMap<String, String>,
    path: &str,
    len: usize,
) -> BTreeMap<String, String> {
    let mut headers = defaults.clone();
    for (name, value) in per_file {
        headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }

    if !has_header(&headers, CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE.to_string(), content_type(path));
    }
    if !has_header(&headers, CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH.to_string(), len.to_string());
    }
    headers
}
