use crate::services::classifier::model_manager::ModelType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_TOP_K: usize = 3;

/// Runtime settings for model storage and classification output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub model_type: ModelType,
    pub use_gpu: bool,
    pub top_k: usize,
    pub min_probability: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            model_type: ModelType::MobileNetV2,
            use_gpu: true,
            top_k: DEFAULT_TOP_K,
            min_probability: 0.0,
        }
    }
}

impl AppConfig {
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.top_k == 0 {
            return Err(crate::error::AppError::config("top_k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(crate::error::AppError::config(format!(
                "min_probability must be within [0, 1], got {}",
                self.min_probability
            )));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("visu-ai")
}
