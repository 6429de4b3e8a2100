//! Inference: the single point of entry for calls to the hosted analysis model.
//!
//! No other module talks to the model endpoint directly. `AppState` carries an
//! `Arc<dyn AnalysisModel>`; production uses `GradioClient`.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::TargetTier;

pub mod gradio;

pub use gradio::GradioClient;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The model ran and reported a failure. Carries the remote message verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Report exceeds {limit} bytes")]
    ReportTooLarge { limit: usize },
}

/// A file forwarded to the model, with the name it is presented under.
#[derive(Debug, Clone)]
pub struct NamedFile {
    pub name: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub pdf: NamedFile,
    pub zip: Option<NamedFile>,
    pub tier: TargetTier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutput {
    pub analysis_text: String,
    /// Remote location of the generated PDF report, when the model produced one.
    pub report_url: Option<String>,
}

#[async_trait]
pub trait AnalysisModel: Send + Sync {
    async fn analyze(&self, input: AnalysisInput) -> Result<AnalysisOutput, InferenceError>;

    /// Downloads a report the model produced.
    async fn fetch_report(&self, url: &str) -> Result<Bytes, InferenceError>;
}
