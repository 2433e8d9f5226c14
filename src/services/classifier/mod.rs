pub mod coordinator;
pub mod inference;
pub mod model_manager;

use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::models::upload_types::DecodedImage;
use async_trait::async_trait;
use std::sync::Arc;

/// A loaded model: given an image, return a ranked label/probability list.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, image: &DecodedImage) -> Result<Vec<Prediction>, AppError>;
}

/// Source of the pretrained model. `load` may be slow and may fail.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn ImageClassifier>, AppError>;
}
