//! Configuration management for the OCR gateway
//!
//! All settings are read once at startup from the environment (with `.env`
//! support via dotenvy) and are immutable afterwards.

use serde::Deserialize;
use std::env;

/// MIME types the service will accept, by upload or by URL.
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/bmp", "image/webp"];

/// File extensions accepted when a multipart upload carries a filename.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub download: DownloadConfig,
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Runtime worker threads; `None` lets the runtime pick (one per core)
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted payload size in bytes (uploads and downloads alike)
    pub max_file_size: u64,
    /// Longer-side pixel cap applied before inference
    pub max_image_dimension: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Hard wall-clock timeout for a remote image fetch, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Recognition language passed to the backend (e.g. "eng")
    pub language: String,
    /// Detections scoring below this are dropped from responses; callers may
    /// override per request. Must be within [0, 1].
    pub confidence_threshold: f64,
    pub device: Device,
    pub model_variant: ModelVariant,
    /// Let the backend detect page/script orientation before recognition
    pub detect_orientation: bool,
    /// Path to the tesseract binary, resolved from PATH when bare
    pub tesseract_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Gpu,
}

/// Named speed/accuracy tradeoff forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Fast,
    Accurate,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                workers: None,
            },
            limits: LimitsConfig {
                max_file_size: 10 * 1024 * 1024,
                max_image_dimension: 4096,
            },
            download: DownloadConfig { timeout_secs: 30 },
            ocr: OcrConfig {
                language: "eng".to_string(),
                confidence_threshold: 0.7,
                device: Device::Cpu,
                model_variant: ModelVariant::Fast,
                detect_orientation: false,
                tesseract_path: "tesseract".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.server.port),
                workers: env::var("WORKERS").ok().and_then(|v| v.parse().ok()),
            },
            limits: LimitsConfig {
                max_file_size: env::var("MAX_FILE_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.limits.max_file_size),
                max_image_dimension: env::var("MAX_IMAGE_DIMENSION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.limits.max_image_dimension),
            },
            download: DownloadConfig {
                timeout_secs: env::var("DOWNLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.download.timeout_secs),
            },
            ocr: OcrConfig {
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                confidence_threshold: env::var("OCR_CONFIDENCE_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v| (0.0..=1.0).contains(v))
                    .unwrap_or(defaults.ocr.confidence_threshold),
                device: match env::var("OCR_DEVICE").as_deref() {
                    Ok("gpu") => Device::Gpu,
                    _ => Device::Cpu,
                },
                model_variant: match env::var("OCR_MODEL_VARIANT").as_deref() {
                    Ok("accurate") => ModelVariant::Accurate,
                    _ => ModelVariant::Fast,
                },
                detect_orientation: env::var("OCR_DETECT_ORIENTATION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.ocr.detect_orientation),
                tesseract_path: env::var("TESSERACT_PATH").unwrap_or(defaults.ocr.tesseract_path),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.limits.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.limits.max_image_dimension, 4096);
        assert_eq!(config.server.workers, None);
        assert_eq!(config.ocr.confidence_threshold, 0.7);
        assert_eq!(config.ocr.device, Device::Cpu);
        assert_eq!(config.ocr.model_variant, ModelVariant::Fast);
    }

    #[test]
    fn worker_count_and_threshold_read_from_env() {
        env::set_var("WORKERS", "4");
        env::set_var("OCR_CONFIDENCE_THRESHOLD", "0.5");
        let config = Config::from_env().unwrap();
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.ocr.confidence_threshold, 0.5);

        // Out-of-range threshold falls back to the default
        env::set_var("OCR_CONFIDENCE_THRESHOLD", "1.5");
        let config = Config::from_env().unwrap();
        assert_eq!(config.ocr.confidence_threshold, 0.7);

        env::remove_var("WORKERS");
        env::remove_var("OCR_CONFIDENCE_THRESHOLD");
    }
}
