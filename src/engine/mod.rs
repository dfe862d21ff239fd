//! Inference engine wrapper
//!
//! Owns the single, expensive-to-construct OCR backend behind an explicit
//! lifecycle: `Uninitialized -> Initializing -> Ready | Failed`. Exactly one
//! initialization attempt runs at a time; concurrent callers wait on the init
//! mutex instead of triggering duplicate loads. Steady-state inference is
//! offloaded to a bounded blocking pool so the request-serving executor (and
//! with it the health probes) stays responsive while the model grinds.
//!
//! The handle is constructed at the composition root and passed through
//! `AppState`; there is no ambient global.

mod backend;
mod types;

pub use backend::{BackendError, OcrBackend, TesseractBackend};
pub use types::{join_text, Detection, EngineState};

use std::sync::Arc;

use image::DynamicImage;
use parking_lot::RwLock;
use tokio::sync::{Mutex, Semaphore};

use crate::config::OcrConfig;
use crate::error::{OcrError, Result};

/// Width of the inference offload pool. Two concurrent model calls saturate a
/// typical host without starving lightweight endpoints.
const INFERENCE_WORKERS: usize = 2;

type BackendFactory =
    Arc<dyn Fn() -> std::result::Result<Box<dyn OcrBackend>, BackendError> + Send + Sync>;

/// Process-wide handle around the opaque OCR backend.
pub struct OcrEngine {
    factory: BackendFactory,
    /// Serializes initialize/shutdown; never held during inference
    init_lock: Mutex<()>,
    state: RwLock<EngineState>,
    backend: RwLock<Option<Arc<dyn OcrBackend>>>,
    workers: Arc<Semaphore>,
}

impl OcrEngine {
    /// Creates an uninitialized engine that will construct a Tesseract
    /// backend from `config` on [`initialize`](Self::initialize).
    pub fn new(config: OcrConfig) -> Self {
        Self::with_factory(Arc::new(move || {
            TesseractBackend::new(&config).map(|b| Box::new(b) as Box<dyn OcrBackend>)
        }))
    }

    /// Seam for injecting a backend factory; the production path goes through
    /// [`new`](Self::new).
    pub fn with_factory(factory: BackendFactory) -> Self {
        Self {
            factory,
            init_lock: Mutex::new(()),
            state: RwLock::new(EngineState::Uninitialized),
            backend: RwLock::new(None),
            workers: Arc::new(Semaphore::new(INFERENCE_WORKERS)),
        }
    }

    /// Constructs the backend, at most once.
    ///
    /// Idempotent when already `Ready`. Failure is terminal for startup: the
    /// engine lands in `Failed` and the caller must not begin serving.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        if *self.state.read() == EngineState::Ready {
            tracing::debug!("engine already initialized");
            return Ok(());
        }

        *self.state.write() = EngineState::Initializing;
        tracing::info!("initializing OCR engine");

        let factory = Arc::clone(&self.factory);
        let built = tokio::task::spawn_blocking(move || factory())
            .await
            .map_err(|e| {
                *self.state.write() = EngineState::Failed;
                OcrError::InitializationFailed(format!("initialization task panicked: {e}"))
            })?;

        match built {
            Ok(backend) => {
                tracing::info!(backend = backend.name(), gpu = backend.gpu_enabled(), "OCR engine ready");
                *self.backend.write() = Some(Arc::from(backend));
                *self.state.write() = EngineState::Ready;
                Ok(())
            }
            Err(e) => {
                *self.state.write() = EngineState::Failed;
                Err(OcrError::InitializationFailed(e.to_string()))
            }
        }
    }

    /// Cheap probe, safe at any time including mid-inference.
    pub fn is_ready(&self) -> bool {
        *self.state.read() == EngineState::Ready
    }

    /// Whether the loaded backend runs on a GPU; false when not initialized.
    pub fn is_gpu_enabled(&self) -> bool {
        self.backend.read().as_ref().map(|b| b.gpu_enabled()).unwrap_or(false)
    }

    /// Runs recognition on the bounded blocking pool.
    ///
    /// Fails with `EngineNotReady` outside the `Ready` state. In-flight calls
    /// are not cancellable once the backend starts; a disconnected client
    /// simply never reads the result.
    pub async fn infer(&self, image: DynamicImage) -> Result<Vec<Detection>> {
        let backend = {
            if !self.is_ready() {
                return Err(OcrError::EngineNotReady);
            }
            self.backend.read().clone().ok_or(OcrError::EngineNotReady)?
        };

        let _permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| OcrError::Internal("inference pool closed".into()))?;

        let outcome = tokio::task::spawn_blocking(move || backend.recognize(&image))
            .await
            .map_err(|e| OcrError::Internal(format!("inference task panicked: {e}")))?;

        outcome.map_err(|e| OcrError::InferenceFailed(e.to_string()))
    }

    /// Releases the backend and returns to `Uninitialized`. New inference
    /// calls are refused immediately; in-flight calls run to completion on
    /// the blocking pool holding their own backend reference.
    pub async fn shutdown(&self) {
        let _guard = self.init_lock.lock().await;
        if self.backend.write().take().is_some() {
            tracing::info!("OCR engine released");
        }
        *self.state.write() = EngineState::Uninitialized;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        detections: Vec<Detection>,
        fail: bool,
    }

    impl OcrBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn gpu_enabled(&self) -> bool {
            false
        }

        fn recognize(&self, _image: &DynamicImage) -> std::result::Result<Vec<Detection>, BackendError> {
            if self.fail {
                return Err(BackendError::Process("synthetic failure".into()));
            }
            Ok(self.detections.clone())
        }
    }

    fn stub_detection(text: &str) -> Detection {
        Detection {
            text: text.to_string(),
            confidence: 0.95,
            polygon: Detection::polygon_from_rect(0.0, 0.0, 10.0, 10.0),
        }
    }

    fn counting_engine(counter: Arc<AtomicUsize>) -> OcrEngine {
        OcrEngine::with_factory(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubBackend {
                detections: vec![stub_detection("hello")],
                fail: false,
            }) as Box<dyn OcrBackend>)
        }))
    }

    fn blank_image() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let engine = counting_engine(Arc::clone(&constructions));

        engine.initialize().await.unwrap();
        engine.initialize().await.unwrap();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(engine.is_ready());
    }

    #[tokio::test]
    async fn concurrent_initializers_construct_once() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(counting_engine(Arc::clone(&constructions)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.initialize().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn infer_before_initialize_is_refused() {
        let engine = counting_engine(Arc::new(AtomicUsize::new(0)));
        let err = engine.infer(blank_image()).await.unwrap_err();
        assert!(matches!(err, OcrError::EngineNotReady));
    }

    #[tokio::test]
    async fn infer_returns_backend_detections_in_order() {
        let engine = OcrEngine::with_factory(Arc::new(|| {
            Ok(Box::new(StubBackend {
                detections: vec![stub_detection("one"), stub_detection("two")],
                fail: false,
            }) as Box<dyn OcrBackend>)
        }));
        engine.initialize().await.unwrap();

        let detections = engine.infer(blank_image()).await.unwrap();
        assert_eq!(join_text(&detections), "one\ntwo");
    }

    #[tokio::test]
    async fn backend_failure_maps_to_inference_failed() {
        let engine = OcrEngine::with_factory(Arc::new(|| {
            Ok(Box::new(StubBackend { detections: vec![], fail: true }) as Box<dyn OcrBackend>)
        }));
        engine.initialize().await.unwrap();

        let err = engine.infer(blank_image()).await.unwrap_err();
        assert!(matches!(err, OcrError::InferenceFailed(_)));
    }

    #[tokio::test]
    async fn failed_construction_lands_in_failed_state() {
        let engine = OcrEngine::with_factory(Arc::new(|| {
            Err(BackendError::Unavailable("no binary".into()))
        }));

        let err = engine.initialize().await.unwrap_err();
        assert!(matches!(err, OcrError::InitializationFailed(_)));
        assert!(!engine.is_ready());
        assert!(!engine.is_gpu_enabled());
    }

    #[tokio::test]
    async fn shutdown_refuses_new_inference() {
        let engine = counting_engine(Arc::new(AtomicUsize::new(0)));
        engine.initialize().await.unwrap();
        assert!(engine.is_ready());

        engine.shutdown().await;
        assert!(!engine.is_ready());
        let err = engine.infer(blank_image()).await.unwrap_err();
        assert!(matches!(err, OcrError::EngineNotReady));
    }
}
