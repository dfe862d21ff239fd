//! OCR endpoints
//!
//! Two entry points, one pipeline. `/upload` takes a multipart file,
//! `/url` downloads from a caller-supplied address; after the bytes are in
//! hand both run size validation -> format validation -> decode -> normalize
//! -> inference and shape the same response envelope. Every response, success
//! or failure, carries the request correlation id.

use std::time::{Duration, Instant};

use axum::{
    extract::{
        multipart::{Field, Multipart},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{join_text, Detection};
use crate::error::{ApiError, OcrError, Result};
use crate::state::AppState;
use crate::{fetcher, imaging, validators};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(ocr_upload))
        .route("/url", post(ocr_url))
}

/// Per-request correlation id and wall-clock timer. Lives for exactly one
/// HTTP call; never persisted.
struct RequestContext {
    request_id: Uuid,
    started: Instant,
}

impl RequestContext {
    fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn fail(&self, error: OcrError) -> ApiError {
        ApiError {
            request_id: self.request_id,
            error,
        }
    }
}

/// Response rendering selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputMode {
    /// Structured JSON envelope (default)
    #[default]
    Json,
    /// Plain newline-joined text body
    Text,
}

fn parse_output_mode(raw: &str) -> Result<OutputMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "json" => Ok(OutputMode::Json),
        "text" => Ok(OutputMode::Text),
        other => Err(OcrError::InvalidParameter(format!(
            "unknown output mode '{other}'; expected 'json' or 'text'"
        ))),
    }
}

/// Range-checks a caller-supplied confidence threshold, falling back to the
/// configured default when the request carries none.
fn resolve_threshold(requested: Option<f64>, default: f64) -> Result<f64> {
    match requested {
        None => Ok(default),
        Some(value) if (0.0..=1.0).contains(&value) => Ok(value),
        Some(value) => Err(OcrError::InvalidParameter(format!(
            "confidence_threshold {value} is out of range; expected 0.0 to 1.0"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct OcrUrlRequest {
    url: String,
    #[serde(default)]
    output: OutputMode,
    /// Per-request override for the configured confidence threshold
    #[serde(default)]
    confidence_threshold: Option<f64>,
}

#[derive(Serialize)]
struct OcrData {
    /// All detected text, newline-joined in model order
    text: String,
    detections: Vec<Detection>,
    processing_time_ms: f64,
    num_detections: usize,
}

#[derive(Serialize)]
struct OcrResponse {
    success: bool,
    message: &'static str,
    data: OcrData,
    request_id: Uuid,
}

/// POST /api/v1/ocr/upload
///
/// Multipart form with a required `file` part and optional `output` and
/// `confidence_threshold` parts.
async fn ocr_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Response, ApiError> {
    let ctx = RequestContext::new();
    let limit = state.config().limits.max_file_size;

    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut output = OutputMode::Json;
    let mut threshold: Option<f64> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(ctx.fail(OcrError::InvalidImage(format!(
                    "malformed multipart body: {e}"
                ))))
            }
        };

        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = read_field_capped(field, limit).await.map_err(|e| ctx.fail(e))?;
                file = Some((filename, bytes));
            }
            Some("output") => {
                let raw = field.text().await.map_err(|e| {
                    ctx.fail(OcrError::InvalidImage(format!("unreadable output field: {e}")))
                })?;
                output = parse_output_mode(&raw).map_err(|e| ctx.fail(e))?;
            }
            Some("confidence_threshold") => {
                let raw = field.text().await.map_err(|e| {
                    ctx.fail(OcrError::InvalidParameter(format!(
                        "unreadable confidence_threshold field: {e}"
                    )))
                })?;
                let value = raw.trim().parse().map_err(|_| {
                    ctx.fail(OcrError::InvalidParameter(format!(
                        "confidence_threshold '{raw}' is not a number"
                    )))
                })?;
                threshold = Some(value);
            }
            _ => {}
        }
    }

    let threshold = resolve_threshold(threshold, state.config().ocr.confidence_threshold)
        .map_err(|e| ctx.fail(e))?;

    let (filename, bytes) =
        file.ok_or_else(|| ctx.fail(OcrError::InvalidImage("missing 'file' part".into())))?;

    tracing::info!(
        request_id = %ctx.request_id,
        filename = filename.as_deref().unwrap_or("<unnamed>"),
        bytes = bytes.len(),
        "processing upload"
    );

    run_pipeline(&state, &ctx, &bytes, filename.as_deref(), output, threshold).await
}

/// POST /api/v1/ocr/url
///
/// JSON body `{"url": ..., "output": "json"|"text"}`.
async fn ocr_url(
    State(state): State<AppState>,
    Json(request): Json<OcrUrlRequest>,
) -> std::result::Result<Response, ApiError> {
    let ctx = RequestContext::new();
    let config = state.config();

    tracing::info!(request_id = %ctx.request_id, url = %request.url, "processing url request");

    // Request parameters are checked before any network activity.
    let threshold =
        resolve_threshold(request.confidence_threshold, config.ocr.confidence_threshold)
            .map_err(|e| ctx.fail(e))?;

    let (bytes, _content_type) = fetcher::fetch(
        state.http_client(),
        &request.url,
        Duration::from_secs(config.download.timeout_secs),
        config.limits.max_file_size,
    )
    .await
    .map_err(|e| ctx.fail(e))?;

    run_pipeline(&state, &ctx, &bytes, None, request.output, threshold).await
}

/// Streams one multipart field into memory, aborting with `TooLarge` the
/// moment the running total passes the limit. Bounds memory without relying
/// on the transport's own body limit, which is disabled on this route.
async fn read_field_capped(mut field: Field<'_>, limit: u64) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let chunk = field
            .chunk()
            .await
            .map_err(|e| OcrError::InvalidImage(format!("failed to read upload: {e}")))?;
        let Some(chunk) = chunk else { break };

        if buf.len() as u64 + chunk.len() as u64 > limit {
            return Err(OcrError::TooLarge {
                size: buf.len() as u64 + chunk.len() as u64,
                limit,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Shared tail of both entry points: validate, decode, normalize, infer,
/// filter by confidence, shape the response.
async fn run_pipeline(
    state: &AppState,
    ctx: &RequestContext,
    bytes: &[u8],
    filename: Option<&str>,
    output: OutputMode,
    threshold: f64,
) -> std::result::Result<Response, ApiError> {
    let limits = &state.config().limits;

    let mut detections = async {
        if let Some(name) = filename {
            validators::validate_filename(name)?;
        }
        validators::validate_file_size(bytes.len() as u64, limits.max_file_size)?;
        validators::validate_image_format(bytes)?;

        let img = imaging::load_and_verify(bytes)?;
        let img = imaging::normalize(img, limits.max_image_dimension);

        state.engine().infer(img).await
    }
    .await
    .map_err(|e| ctx.fail(e))?;

    // Low-confidence regions are dropped rather than surfaced; order of the
    // survivors stays as the model returned them.
    detections.retain(|d| d.confidence >= threshold);

    let num_detections = detections.len();
    let data = OcrData {
        text: join_text(&detections),
        detections,
        processing_time_ms: ctx.elapsed_ms(),
        num_detections,
    };

    tracing::info!(
        request_id = %ctx.request_id,
        detections = num_detections,
        elapsed_ms = data.processing_time_ms,
        "request completed"
    );

    Ok(match output {
        OutputMode::Json => (
            StatusCode::OK,
            Json(OcrResponse {
                success: true,
                message: "OCR processing completed successfully",
                data,
                request_id: ctx.request_id,
            }),
        )
            .into_response(),
        OutputMode::Text => (
            StatusCode::OK,
            [("x-request-id", ctx.request_id.to_string())],
            data.text,
        )
            .into_response(),
    })
}
