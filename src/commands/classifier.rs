use crate::error::AppError;
use crate::models::classify_types::ModelStatus;
use crate::models::upload_types::{BatchView, UploadBatch};
use crate::services::classifier::model_manager::OnnxModelProvider;
use crate::services::fs_service;
use crate::AppState;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub fn get_model_status(state: &AppState) -> ModelStatus {
    state.coordinator.status()
}

/// Download the model files. Ctrl-C cancels the transfer and removes the
/// partial file.
pub async fn download_model(provider: &OnnxModelProvider) -> Result<(), AppError> {
    let cancel = provider.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancelling model download");
            cancel.cancel_download();
        }
    });

    let result = provider.download_model().await;
    interrupt.abort();
    result
}

pub async fn load_model(state: &AppState) -> Result<ModelStatus, AppError> {
    state.coordinator.ensure_ready().await?;
    Ok(state.coordinator.status())
}

/// Kick off the one-time model load in the background, as the display
/// surface does when it first appears.
pub fn start_model_load(state: &AppState) -> JoinHandle<()> {
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = coordinator.ensure_ready().await {
            error!(error = %e, "background model load failed");
        }
    })
}

pub async fn select_files(state: &AppState, batch: UploadBatch) -> BatchView {
    state.batches.select_files(batch).await
}

pub async fn classify_paths(
    state: &AppState,
    paths: &[PathBuf],
    recursive: bool,
) -> Result<BatchView, AppError> {
    let files = fs_service::expand_selection(paths, recursive)?;
    Ok(select_files(state, UploadBatch::new(files)).await)
}
