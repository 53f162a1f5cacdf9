//! Content writing: conditional GET, byte ranges, MIME detection
//!
//! Given an open file and its metadata, produces the status, caching
//! headers, and body bytes for the response. The orchestrator applies
//! content-encoding afterwards.

use bytes::Bytes;
use http::{Request, StatusCode, header};
use std::io::SeekFrom;
use std::time::SystemTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A framed piece of file content, before content-encoding
pub(crate) struct ServedContent {
    pub status: StatusCode,
    pub content_type: String,
    pub last_modified: Option<String>,
    pub content_range: Option<String>,
    pub body: Bytes,
}

/// Read the requested slice of `file` and frame it.
///
/// Handles `If-Modified-Since` (304) and a single `Range: bytes=..`
/// (206). Syntactically invalid or unsatisfiable ranges fall back to a
/// full 200 response.
pub(crate) async fn serve_content(
    req: &Request<()>,
    name: &str,
    modified: Option<SystemTime>,
    mut file: File,
    size: u64,
) -> std::io::Result<ServedContent> {
    let content_type = mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string();
    let last_modified = modified.map(httpdate::fmt_http_date);

    if let (Some(modified), Some(since)) = (modified, if_modified_since(req)) {
        // HTTP dates have one-second resolution.
        let unchanged = modified
            .duration_since(since)
            .map(|d| d.as_secs() == 0)
            .unwrap_or(true);
        if unchanged {
            return Ok(ServedContent {
                status: StatusCode::NOT_MODIFIED,
                content_type,
                last_modified,
                content_range: None,
                body: Bytes::new(),
            });
        }
    }

    let range = req
        .headers()
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, size));

    let (status, content_range, start, length) = match range {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            Some(format!("bytes {}-{}/{}", start, end, size)),
            start,
            end - start + 1,
        ),
        None => (StatusCode::OK, None, 0, size),
    };

    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    let mut body = vec![0u8; length as usize];
    file.read_exact(&mut body).await?;

    Ok(ServedContent {
        status,
        content_type,
        last_modified,
        content_range,
        body: Bytes::from(body),
    })
}

fn if_modified_since(req: &Request<()>) -> Option<SystemTime> {
    req.headers()
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
}

/// Parse a single `bytes=start-end` range against `size`
fn parse_range(header: &str, size: u64) -> Option<(u64, u64)> {
    let value = header.strip_prefix("bytes=")?;
    if value.contains(',') {
        // Multipart ranges are not supported.
        return None;
    }

    let (start_str, end_str) = value.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        // Suffix range: the last N bytes.
        let n: u64 = end_str.parse().ok()?;
        if n == 0 || size == 0 {
            return None;
        }
        return Some((size.saturating_sub(n), size - 1));
    }

    let start: u64 = start_str.parse().ok()?;
    let end: u64 = if end_str.is_empty() {
        size.checked_sub(1)?
    } else {
        end_str.parse().ok()?
    };

    if start > end || start >= size {
        return None;
    }

    Some((start, end.min(size - 1)))
}
