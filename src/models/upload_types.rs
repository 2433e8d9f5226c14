use crate::error::{AppError, ErrorKind};
use crate::models::classify_types::Prediction;
use crate::services::file_source::FileSource;
use image::DynamicImage;
use serde::Serialize;
use std::sync::Arc;

/// Identity token of one user selection. Later selections get larger ids.
pub type BatchId = u64;

/// Ordered, immutable set of files captured from one selection event.
#[derive(Clone, Default)]
pub struct UploadBatch {
    files: Vec<Arc<dyn FileSource>>,
}

impl UploadBatch {
    pub fn new(files: Vec<Arc<dyn FileSource>>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[Arc<dyn FileSource>] {
        &self.files
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl std::fmt::Debug for UploadBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadBatch")
            .field("files", &self.file_names())
            .finish()
    }
}

/// A file after a successful decode. `index` is its position in the batch.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub index: usize,
    pub file_name: String,
    pub image: Arc<DynamicImage>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Displayable data URL of one file, appended when its read completes.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PreviewEntry {
    pub index: usize,
    pub file_name: String,
    pub data_url: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AppError> for ErrorNotice {
    fn from(err: &AppError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

/// Everything the display surface renders for the current batch.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct BatchView {
    pub batch_id: BatchId,
    pub file_names: Vec<String>,
    pub previews: Vec<PreviewEntry>,
    /// `None` until every image of the batch went through classification.
    pub predictions: Option<Vec<Prediction>>,
    pub processing: bool,
    pub model_loading: bool,
    pub busy: bool,
    pub last_error: Option<ErrorNotice>,
}
