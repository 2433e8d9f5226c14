//! Mock classifiers, providers and files for testing
//!
//! Configurable stand-ins for the pretrained model and the file picker so the
//! pipeline, coordinator and batch controller can be exercised without a
//! real model on disk.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use visu_ai_lib::services::classifier::{ImageClassifier, ModelProvider};
use visu_ai_lib::services::file_source::{FileSource, MemoryFile};
use visu_ai_lib::{AppError, DecodedImage, Prediction, UploadBatch};

/// Encode a small solid-colour PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([120, 80, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Encode a JPEG and splice in an EXIF APP1 segment carrying `orientation`.
pub fn jpeg_with_orientation(width: u32, height: u32, orientation: u16) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    let jpeg = buf.into_inner();

    // Big-endian TIFF header, one IFD entry: Orientation (0x0112), SHORT, count 1
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&[0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
    payload.extend_from_slice(&[0x00, 0x01]);
    payload.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    payload.extend_from_slice(&orientation.to_be_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let len = (payload.len() + 2) as u16;
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn memory_png(name: &str) -> Arc<dyn FileSource> {
    Arc::new(MemoryFile::new(name, png_bytes(8, 6)))
}

pub fn batch(files: Vec<Arc<dyn FileSource>>) -> UploadBatch {
    UploadBatch::new(files)
}

/// A file that takes `delay` to read and may fail.
pub struct SlowFile {
    name: String,
    bytes: Vec<u8>,
    delay: Duration,
    fail: bool,
}

impl SlowFile {
    pub fn png(name: &str, delay: Duration) -> Arc<dyn FileSource> {
        Arc::new(Self {
            name: name.to_string(),
            bytes: png_bytes(8, 6),
            delay,
            fail: false,
        })
    }

    pub fn bytes(name: &str, bytes: Vec<u8>, delay: Duration) -> Arc<dyn FileSource> {
        Arc::new(Self {
            name: name.to_string(),
            bytes,
            delay,
            fail: false,
        })
    }

    pub fn unreadable(name: &str) -> Arc<dyn FileSource> {
        Self::unreadable_after(name, Duration::ZERO)
    }

    pub fn unreadable_after(name: &str, delay: Duration) -> Arc<dyn FileSource> {
        Arc::new(Self {
            name: name.to_string(),
            bytes: Vec::new(),
            delay,
            fail: true,
        })
    }
}

#[async_trait]
impl FileSource for SlowFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<Vec<u8>, AppError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(AppError::read(&self.name, "device not ready"));
        }
        Ok(self.bytes.clone())
    }
}

/// Classifier answering from a per-file table.
pub struct MockClassifier {
    answers: HashMap<String, Vec<Prediction>>,
    failing: HashSet<String>,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            failing: HashSet::new(),
            simulated_latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the predictions returned for `file_name`
    pub fn with_answer(mut self, file_name: &str, predictions: &[(&str, f32)]) -> Self {
        let preds = predictions
            .iter()
            .map(|(label, p)| Prediction::new(*label, *p))
            .collect();
        self.answers.insert(file_name.to_string(), preds);
        self
    }

    /// Make classification of `file_name` fail
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ImageClassifier for MockClassifier {
    async fn classify(&self, image: &DecodedImage) -> Result<Vec<Prediction>, AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.contains(&image.file_name) {
            return Err("inference backend crashed".into());
        }
        Ok(self.answers.get(&image.file_name).cloned().unwrap_or_default())
    }
}

/// Provider handing out one shared classifier.
pub struct MockProvider {
    classifier: Arc<MockClassifier>,
    load_latency: Duration,
    fail: bool,
    load_count: AtomicU32,
}

impl MockProvider {
    pub fn new(classifier: Arc<MockClassifier>) -> Self {
        Self {
            classifier,
            load_latency: Duration::ZERO,
            fail: false,
            load_count: AtomicU32::new(0),
        }
    }

    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn load_count(&self) -> u32 {
        self.load_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn load(&self) -> Result<Arc<dyn ImageClassifier>, AppError> {
        self.load_count.fetch_add(1, Ordering::Relaxed);
        if !self.load_latency.is_zero() {
            tokio::time::sleep(self.load_latency).await;
        }
        if self.fail {
            return Err(AppError::model_load("weights unavailable"));
        }
        Ok(self.classifier.clone())
    }
}

/// Classifier used by the cat/dog scenario.
pub fn pets_classifier() -> MockClassifier {
    MockClassifier::new()
        .with_answer("cat.jpg", &[("tabby cat", 0.92)])
        .with_answer("dog.jpg", &[("beagle", 0.81)])
}
