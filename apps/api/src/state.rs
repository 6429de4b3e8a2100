use std::sync::Arc;

use crate::config::Config;
use crate::inference::AnalysisModel;
use crate::payments::gateway::PaymentGateway;
use crate::storage::BlobStore;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Users, payments and analyses. Postgres in production, in-memory otherwise.
    pub store: Arc<dyn Store>,
    /// Uploaded documents and fetched reports, scoped per user.
    pub blobs: Arc<dyn BlobStore>,
    /// Hosted analysis model. Default: GradioClient.
    pub model: Arc<dyn AnalysisModel>,
    pub gateway: PaymentGateway,
    pub config: Config,
}
