//! Snapshot renderers
//!
//! A renderer turns one view's aggregated data into the opaque blob the cache
//! serves. The cache treats an error or an empty blob as a failure of that
//! key only.

use super::views::{SnapshotWindow, ViewData, ViewName};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Renderer produced an empty blob")]
    Empty,

    #[error("Render failed: {0}")]
    Failed(String),
}

pub trait SnapshotRenderer: Send + Sync {
    fn render(
        &self,
        view: ViewName,
        window: SnapshotWindow,
        data: &ViewData,
    ) -> Result<Vec<u8>, RenderError>;

    /// MIME type of the rendered blobs
    fn content_type(&self) -> &'static str;
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    view: ViewName,
    window: SnapshotWindow,
    has_data: bool,
    data: &'a ViewData,
}

/// Renders views as JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer {
    pretty: bool,
}

impl JsonRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SnapshotRenderer for JsonRenderer {
    fn render(
        &self,
        view: ViewName,
        window: SnapshotWindow,
        data: &ViewData,
    ) -> Result<Vec<u8>, RenderError> {
        let doc = JsonDocument {
            view,
            window,
            has_data: data.has_data(),
            data,
        };

        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&doc)?
        } else {
            serde_json::to_vec(&doc)?
        };
        Ok(bytes)
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
