//! Serving responses backed by files on disk.

use super::response::MockBody;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Bytes inspected to guess the content type
const SNIFF_LEN: usize = 512;

/// Resolve a response file relative to the definition file it was declared in
pub fn resolve_path(file_path: &str, source_path: Option<&Path>) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match source_path.and_then(Path::parent) {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

/// Stream a file as the response body with a sniffed content type and its length.
///
/// A `Content-Type` given in `headers` takes precedence over the sniffed one.
pub async fn file_response(
    status: StatusCode,
    mut headers: HeaderMap,
    path: &Path,
) -> std::io::Result<Response<MockBody>> {
    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();

    let head_len = usize::try_from(len).unwrap_or(SNIFF_LEN).min(SNIFF_LEN);
    let mut head = vec![0u8; head_len];
    file.read_exact(&mut head).await?;
    file.seek(SeekFrom::Start(0)).await?;

    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(sniff_content_type(&head, path)),
        );
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));

    let stream = ReaderStream::new(file).map_ok(Frame::data);
    let mut response = Response::new(StreamBody::new(stream).boxed_unsync());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Guess a content type from leading bytes, using the extension only to refine text
pub fn sniff_content_type(head: &[u8], path: &Path) -> &'static str {
    const MAGIC: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/gzip"),
        (b"\x00asm", "application/wasm"),
        (b"OggS", "audio/ogg"),
        (b"ID3", "audio/mpeg"),
    ];

    if let Some((_, mime)) = MAGIC.iter().find(|(magic, _)| head.starts_with(magic)) {
        return *mime;
    }
    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return "image/webp";
    }

    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // A multi-byte character may be cut at the sniff boundary
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return "application/octet-stream",
    };
    if text.contains('\0') {
        return "application/octet-stream";
    }

    let trimmed = text.trim_start_matches(['\u{feff}', ' ', '\t', '\r', '\n']);
    let lower = trimmed
        .get(..trimmed.len().min(16))
        .unwrap_or_default()
        .to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return "text/html; charset=utf-8";
    }
    if lower.starts_with("<svg") {
        return "image/svg+xml";
    }
    if lower.starts_with("<?xml") {
        return "text/xml; charset=utf-8";
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return "application/json";
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        _ => "text/plain; charset=utf-8",
    }
}
