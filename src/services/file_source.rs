use crate::error::AppError;
use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;

/// A user-selected file whose full contents can be read asynchronously.
#[async_trait]
pub trait FileSource: Send + Sync {
    fn name(&self) -> &str;

    async fn read(&self) -> Result<Vec<u8>, AppError>;
}

/// File on the local disk.
pub struct PathFile {
    name: String,
    path: PathBuf,
}

impl PathFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Self { name, path }
    }
}

#[async_trait]
impl FileSource for PathFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<Vec<u8>, AppError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| AppError::read(&self.name, e))
    }
}

/// File whose bytes are already in memory (drag and drop, clipboard, tests).
pub struct MemoryFile {
    name: String,
    bytes: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<Vec<u8>, AppError> {
        Ok(self.bytes.clone())
    }
}

/// Sniff the MIME type from the leading bytes. Unknown content is still
/// offered to the decoder, so it gets the generic binary type.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Encode file contents as a `data:` URL.
pub fn to_data_url(bytes: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", sniff_mime(bytes), b64)
}
