//! OCR backends
//!
//! The engine wrapper talks to the model through [`OcrBackend`]: a synchronous
//! image-in/detections-out contract. The shipping implementation drives the
//! Tesseract binary as an external process and parses its TSV output into
//! line-level detections with confidences and bounding polygons.

use std::process::Command;

use image::DynamicImage;
use uuid::Uuid;

use crate::config::{Device, ModelVariant, OcrConfig};

use super::types::Detection;

/// Errors internal to a backend. The engine wrapper maps these onto the
/// request-facing taxonomy; callers never see them directly.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recognition failed: {0}")]
    Process(String),

    #[error("could not parse backend output: {0}")]
    Parse(String),
}

/// Synchronous, CPU/GPU-bound recognition contract.
///
/// `recognize` blocks for the duration of a model call and must only run on
/// the engine's worker pool. Implementations are expected to tolerate
/// concurrent calls.
pub trait OcrBackend: Send + Sync {
    /// Human-readable backend identifier for logs and the info endpoint
    fn name(&self) -> &'static str;

    /// Whether the backend actually runs on a GPU
    fn gpu_enabled(&self) -> bool;

    /// Runs recognition on a normalized image, preserving model output order.
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>, BackendError>;
}

/// Tesseract invoked as an external process with TSV output.
pub struct TesseractBackend {
    binary: String,
    language: String,
    /// OCR engine mode: LSTM only for the fast variant, combined for accurate
    oem: &'static str,
    /// Page segmentation: auto with orientation/script detection when enabled
    psm: &'static str,
}

impl TesseractBackend {
    /// Probes the binary and the requested language pack. This is the
    /// expensive, run-once part of engine initialization; per-request calls
    /// assume the probes already passed.
    pub fn new(config: &OcrConfig) -> Result<Self, BackendError> {
        let version = Command::new(&config.tesseract_path)
            .arg("--version")
            .output()
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "tesseract binary '{}' not runnable: {e}",
                    config.tesseract_path
                ))
            })?;
        if !version.status.success() {
            return Err(BackendError::Unavailable(
                "tesseract --version exited with an error".into(),
            ));
        }
        let version_line = String::from_utf8_lossy(&version.stdout)
            .lines()
            .next()
            .unwrap_or("tesseract (unknown version)")
            .to_string();

        let langs = Command::new(&config.tesseract_path)
            .arg("--list-langs")
            .output()?;
        let lang_list = String::from_utf8_lossy(&langs.stdout).to_string();
        if !lang_list.lines().skip(1).any(|l| l.trim() == config.language) {
            return Err(BackendError::Unavailable(format!(
                "language pack '{}' is not installed",
                config.language
            )));
        }

        if config.device == Device::Gpu {
            tracing::warn!("tesseract backend has no GPU path, running on CPU");
        }

        tracing::info!(
            version = %version_line,
            language = %config.language,
            variant = ?config.model_variant,
            "tesseract backend ready"
        );

        Ok(Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            oem: match config.model_variant {
                ModelVariant::Fast => "1",
                ModelVariant::Accurate => "2",
            },
            psm: if config.detect_orientation { "1" } else { "3" },
        })
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn gpu_enabled(&self) -> bool {
        false
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Vec<Detection>, BackendError> {
        let input_path = std::env::temp_dir().join(format!("ocr_gateway_{}.png", Uuid::new_v4()));
        image
            .save_with_format(&input_path, image::ImageFormat::Png)
            .map_err(|e| BackendError::Process(format!("failed to stage image: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(&input_path)
            .arg("stdout")
            .args(["-l", &self.language, "--oem", self.oem, "--psm", self.psm, "tsv"])
            .output();

        let _ = std::fs::remove_file(&input_path);

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Process(format!("tesseract failed: {stderr}")));
        }

        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Word-level row of tesseract's TSV output (level 5).
struct TsvWord {
    block: u32,
    par: u32,
    line: u32,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    conf: f64,
    text: String,
}

/// Parses tesseract TSV output into line-level detections.
///
/// Words (level 5 rows with a non-negative confidence) are grouped by their
/// (block, paragraph, line) triple in order of appearance; each group becomes
/// one detection whose confidence is the mean word confidence scaled to
/// [0, 1] and whose polygon is the group's bounding rectangle.
fn parse_tsv(tsv: &str) -> Result<Vec<Detection>, BackendError> {
    let mut words: Vec<TsvWord> = Vec::new();

    for (line_no, row) in tsv.lines().enumerate().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue; // blank or malformed trailing row
        }
        if cols[0] != "5" {
            continue;
        }

        let parse_num = |idx: usize| -> Result<f64, BackendError> {
            cols[idx].parse().map_err(|_| {
                BackendError::Parse(format!("bad numeric field '{}' on row {line_no}", cols[idx]))
            })
        };

        let conf = parse_num(10)?;
        let text = cols[11].trim();
        if conf < 0.0 || text.is_empty() {
            continue; // non-text region
        }

        words.push(TsvWord {
            block: parse_num(2)? as u32,
            par: parse_num(3)? as u32,
            line: parse_num(4)? as u32,
            left: parse_num(6)?,
            top: parse_num(7)?,
            width: parse_num(8)?,
            height: parse_num(9)?,
            conf,
            text: text.to_string(),
        });
    }

    let mut detections: Vec<Detection> = Vec::new();
    let mut group: Vec<&TsvWord> = Vec::new();

    for word in &words {
        if let Some(prev) = group.last() {
            if (prev.block, prev.par, prev.line) != (word.block, word.par, word.line) {
                detections.push(flush_line(&group));
                group.clear();
            }
        }
        group.push(word);
    }
    if !group.is_empty() {
        detections.push(flush_line(&group));
    }

    Ok(detections)
}

fn flush_line(words: &[&TsvWord]) -> Detection {
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    let confidence =
        (words.iter().map(|w| w.conf).sum::<f64>() / words.len() as f64 / 100.0).clamp(0.0, 1.0);

    let left = words.iter().map(|w| w.left).fold(f64::INFINITY, f64::min);
    let top = words.iter().map(|w| w.top).fold(f64::INFINITY, f64::min);
    let right = words.iter().map(|w| w.left + w.width).fold(f64::NEG_INFINITY, f64::max);
    let bottom = words.iter().map(|w| w.top + w.height).fold(f64::NEG_INFINITY, f64::max);

    Detection {
        text,
        confidence,
        polygon: Detection::polygon_from_rect(left, top, right - left, bottom - top),
    }
}
