//! Read and decode every file of an upload batch.
//!
//! All per-file futures are started together and joined with all-or-nothing
//! semantics: the first read or decode failure fails the whole ingest. The
//! decoded images come back in input order even though previews are reported
//! in the order the reads finish.

use crate::error::AppError;
use crate::models::upload_types::{DecodedImage, PreviewEntry, UploadBatch};
use crate::services::decode_service;
use crate::services::file_source::{self, FileSource};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct ImageIngestionPipeline;

impl ImageIngestionPipeline {
    pub fn new() -> Self {
        Self
    }

    /// Ingest a batch. `on_preview` is called once per file as soon as its
    /// contents have been read, before decoding starts.
    pub async fn ingest<F>(
        &self,
        batch: &UploadBatch,
        on_preview: F,
    ) -> Result<Vec<DecodedImage>, AppError>
    where
        F: Fn(PreviewEntry) + Send + Sync,
    {
        let on_preview = &on_preview;
        let jobs = batch
            .files()
            .iter()
            .enumerate()
            .map(|(index, file)| load_image(index, file.clone(), on_preview));

        try_join_all(jobs).await
    }
}

async fn load_image<F>(
    index: usize,
    file: Arc<dyn FileSource>,
    on_preview: &F,
) -> Result<DecodedImage, AppError>
where
    F: Fn(PreviewEntry) + Send + Sync,
{
    let file_name = file.name().to_string();
    let bytes = file.read().await?;
    debug!(file = %file_name, size = bytes.len(), "file read");

    on_preview(PreviewEntry {
        index,
        file_name: file_name.clone(),
        data_url: file_source::to_data_url(&bytes),
    });

    let name = file_name.clone();
    let image = tokio::task::spawn_blocking(move || decode_service::decode_image(&name, &bytes))
        .await
        .map_err(|e| AppError::decode(&file_name, format!("decode task failed: {}", e)))??;
    debug!(file = %file_name, width = image.width(), height = image.height(), "image decoded");

    Ok(DecodedImage {
        index,
        file_name,
        image: Arc::new(image),
    })
}
