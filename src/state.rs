//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::engine::OcrEngine;

/// Shared application state: configuration, the engine handle, and the HTTP
/// client reused across remote fetches.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    engine: OcrEngine,
    http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, engine: OcrEngine, http_client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, engine, http_client }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn engine(&self) -> &OcrEngine {
        &self.inner.engine
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.inner.http_client
    }

    /// Releases the engine; called once on the graceful-shutdown path.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down application state");
        self.inner.engine.shutdown().await;
    }
}
