pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

use config::AppConfig;
use services::batch::BatchController;
use services::classifier::coordinator::ClassificationCoordinator;
use services::classifier::model_manager::OnnxModelProvider;
use services::classifier::ModelProvider;
use services::describe_service::DescriptionService;
use std::sync::Arc;

pub use error::{AppError, ErrorKind};
pub use models::classify_types::{ModelState, ModelStatus, Prediction};
pub use models::upload_types::{BatchView, DecodedImage, PreviewEntry, UploadBatch};

/// Handles shared by every entry point. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: ClassificationCoordinator,
    pub batches: BatchController,
    pub descriptions: DescriptionService,
}

impl AppState {
    /// Call from inside a tokio runtime.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        let coordinator = ClassificationCoordinator::new(provider);
        Self {
            batches: BatchController::new(coordinator.clone()),
            coordinator,
            descriptions: DescriptionService::new(),
        }
    }

    /// State backed by the ONNX model described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<(Self, OnnxModelProvider), AppError> {
        config.validate()?;
        let provider = OnnxModelProvider::new(config);
        Ok((Self::new(Arc::new(provider.clone())), provider))
    }
}
