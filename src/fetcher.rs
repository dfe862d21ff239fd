//! Remote image fetching
//!
//! Downloads an image from a caller-supplied URL under strict constraints:
//! the URL passes the SSRF check before any connection is opened, the fetch
//! carries a hard wall-clock timeout, the declared Content-Type must be an
//! allowed image type, and the body is streamed into memory with a byte cap
//! that fires regardless of what the Content-Length header claimed.

use std::fmt::Display;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;

use crate::error::{OcrError, Result};
use crate::validators::{validate_content_type, validate_file_size, validate_url_safety};

/// Builds the shared HTTP client used for all remote fetches.
///
/// Redirects are disabled: the SSRF check runs on the URL the caller gave us,
/// and a redirect would let the remote server pick a new, unchecked target.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| OcrError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Downloads `raw_url` and returns the body plus its declared content type.
pub async fn fetch(
    client: &Client,
    raw_url: &str,
    timeout: Duration,
    max_size: u64,
) -> Result<(Bytes, String)> {
    let url = validate_url_safety(raw_url)?;

    tracing::info!(url = %url, "downloading remote image");

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| OcrError::DownloadFailed(format!("request failed: {e}")))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(OcrError::DownloadFailed(format!("remote server returned HTTP {status}")));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    validate_content_type(&content_type)?;

    // Cheap early reject when the server declares a length. The streaming cap
    // below still applies because the header may be absent or lying.
    if let Some(declared) = response.content_length() {
        validate_file_size(declared, max_size)?;
    }

    let body = collect_capped(Box::pin(response.bytes_stream()), max_size).await?;
    tracing::info!(bytes = body.len(), "remote image downloaded");

    Ok((body, content_type))
}

/// Accumulates a chunk stream into one buffer, aborting with `TooLarge` the
/// instant the running total exceeds `max_size`.
pub async fn collect_capped<S, E>(mut stream: S, max_size: u64) -> Result<Bytes>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| OcrError::DownloadFailed(format!("transfer failed: {e}")))?;
        if buf.len() as u64 + chunk.len() as u64 > max_size {
            return Err(OcrError::TooLarge {
                size: buf.len() as u64 + chunk.len() as u64,
                limit: max_size,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
