use crate::config::AppConfig;
use crate::error::AppError;
use crate::services::classifier::inference::OnnxClassifier;
use crate::services::classifier::{ImageClassifier, ModelProvider};
use async_trait::async_trait;
use futures::StreamExt;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
pub enum ModelType {
    #[value(name = "mobilenet-v2")]
    MobileNetV2,
    #[value(name = "convnext-base")]
    ConvNextBase,
    #[value(name = "convnext-large")]
    ConvNextLarge,
}

impl ModelType {
    fn config(&self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            ModelType::MobileNetV2 => (
                "https://huggingface.co/Xenova/mobilenet_v2_1.0_224/resolve/main/onnx/model.onnx",
                "https://huggingface.co/Xenova/mobilenet_v2_1.0_224/resolve/main/config.json",
                "mobilenet_v2_1.0_224.onnx",
                "mobilenet_v2_1.0_224-config.json",
            ),
            ModelType::ConvNextBase => (
                "https://huggingface.co/Xenova/convnextv2-base-22k-384/resolve/main/onnx/model.onnx",
                "https://huggingface.co/Xenova/convnextv2-base-22k-384/resolve/main/config.json",
                "convnextv2-base-22k-384.onnx",
                "convnextv2-base-22k-384-config.json",
            ),
            ModelType::ConvNextLarge => (
                "https://huggingface.co/Xenova/convnextv2-large-22k-384/resolve/main/onnx/model.onnx",
                "https://huggingface.co/Xenova/convnextv2-large-22k-384/resolve/main/config.json",
                "convnextv2-large-22k-384.onnx",
                "convnextv2-large-22k-384-config.json",
            ),
        }
    }

    pub fn crop_size(&self) -> u32 {
        match self {
            ModelType::ConvNextBase | ModelType::ConvNextLarge => 384,
            ModelType::MobileNetV2 => 224,
        }
    }
}

/// Downloads a pretrained ONNX classifier on first use and builds a session.
#[derive(Clone)]
pub struct OnnxModelProvider {
    pub model_dir: PathBuf,
    pub model_type: ModelType,
    pub use_gpu: bool,
    pub top_k: usize,
    pub min_probability: f32,
    cancel_flag: Arc<AtomicBool>,
}

impl OnnxModelProvider {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            model_dir: config.model_dir(),
            model_type: config.model_type,
            use_gpu: config.use_gpu,
            top_k: config.top_k,
            min_probability: config.min_probability,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_download(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn model_path(&self) -> PathBuf {
        let (_, _, filename, _) = self.model_type.config();
        self.model_dir.join(filename)
    }

    pub fn config_path(&self) -> PathBuf {
        let (_, _, _, filename) = self.model_type.config();
        self.model_dir.join(filename)
    }

    pub fn is_downloaded(&self) -> bool {
        self.model_path().exists() && self.config_path().exists()
    }

    pub async fn download_model(&self) -> Result<(), AppError> {
        if self.is_downloaded() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.model_dir).await.map_err(|e| {
            AppError::model_load(format!("Failed to create model directory: {}", e))
        })?;

        self.cancel_flag.store(false, Ordering::Relaxed);
        let (model_url, config_url, _, _) = self.model_type.config();

        let config_path = self.config_path();
        if !config_path.exists() {
            download_file(config_url, &config_path, &self.cancel_flag).await?;
        }

        let model_path = self.model_path();
        if !model_path.exists() {
            download_file(model_url, &model_path, &self.cancel_flag).await?;
        }

        Ok(())
    }

    async fn build_classifier(&self) -> Result<OnnxClassifier, AppError> {
        let config_path = self.config_path();
        let config_content = tokio::fs::read_to_string(&config_path).await.map_err(|e| {
            AppError::model_load(format!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            ))
        })?;
        let labels = parse_labels(&config_content)?;

        let model_path = self.model_path();
        let use_gpu = self.use_gpu;
        let session = tokio::task::spawn_blocking(move || build_session(&model_path, use_gpu))
            .await
            .map_err(|e| AppError::model_load(format!("Failed to spawn model loading task: {}", e)))??;

        Ok(OnnxClassifier::new(
            session,
            labels,
            self.model_type.crop_size(),
            self.top_k,
            self.min_probability,
        ))
    }
}

#[async_trait]
impl ModelProvider for OnnxModelProvider {
    async fn load(&self) -> Result<Arc<dyn ImageClassifier>, AppError> {
        self.download_model().await?;
        let classifier = self.build_classifier().await?;
        info!(model = ?self.model_type, gpu = self.use_gpu, "ONNX session ready");
        Ok(Arc::new(classifier))
    }
}

/// Upper bound on classifier output classes (ImageNet-22k has 21,841).
const MAX_LABELS: usize = 65_536;

/// Read the `id2label` map of a Hugging Face `config.json`, ordered by index.
pub fn parse_labels(config_content: &str) -> Result<Vec<String>, AppError> {
    let config: serde_json::Value = serde_json::from_str(config_content)
        .map_err(|e| AppError::model_load(format!("Failed to parse config JSON: {}", e)))?;

    let id2label = config["id2label"]
        .as_object()
        .ok_or_else(|| AppError::model_load("Config missing id2label field"))?;

    let mut labels: Vec<(usize, String)> = id2label
        .iter()
        .filter_map(|(k, v)| {
            let idx = k.parse::<usize>().ok()?;
            let label = v.as_str().unwrap_or("unknown").to_string();
            Some((idx, label))
        })
        .collect();
    labels.sort_by_key(|(idx, _)| *idx);

    if let Some((idx, _)) = labels.last() {
        if *idx >= MAX_LABELS {
            return Err(AppError::model_load(format!(
                "Label index {} exceeds the supported maximum of {}",
                idx, MAX_LABELS
            )));
        }
    }

    // Keep positions aligned with logits even if the map has holes
    let len = labels.last().map(|(idx, _)| idx + 1).unwrap_or(0);
    let mut ordered: Vec<String> = (0..len).map(|i| format!("class_{}", i)).collect();
    for (idx, label) in labels {
        ordered[idx] = label;
    }
    Ok(ordered)
}

fn build_session(model_path: &Path, use_gpu: bool) -> Result<Session, AppError> {
    let _ = ort::init().with_name("visu-ai").commit();

    let mut builder = Session::builder()
        .map_err(|e| AppError::model_load(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(|e| AppError::model_load(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(4)
        .map_err(|e| AppError::model_load(format!("Failed to set intra threads: {}", e)))?;

    if use_gpu {
        builder = builder
            .with_execution_providers([
                ort::execution_providers::DirectMLExecutionProvider::default().build(),
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CUDAExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| AppError::model_load(format!("Failed to register GPU execution providers: {}", e)))?;
    } else {
        builder = builder
            .with_execution_providers([ort::execution_providers::CPUExecutionProvider::default().build()])
            .map_err(|e| AppError::model_load(format!("Failed to register CPU execution provider: {}", e)))?;
    }

    builder
        .commit_from_file(model_path)
        .map_err(|e| AppError::model_load(format!("Failed to load ONNX model: {}", e)))
}

async fn download_file(url: &str, dest: &Path, cancel_flag: &AtomicBool) -> Result<(), AppError> {
    info!(url, dest = %dest.display(), "downloading model file");
    let client = reqwest::Client::new();
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(AppError::model_load(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    // Write to a temp name so an interrupted download never looks complete
    let partial = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await.map_err(|e| {
        AppError::model_load(format!("Failed to create file {}: {}", partial.display(), e))
    })?;

    let mut stream = response.bytes_stream();
    let mut last_logged = 0;

    while let Some(chunk) = stream.next().await {
        if cancel_flag.load(Ordering::Relaxed) {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(AppError::model_load("Download cancelled"));
        }

        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk)
            .await
            .map_err(|e| AppError::model_load(format!("Failed to write to file: {}", e)))?;

        if total_size > 0 {
            let progress = (downloaded * 100) / total_size;
            if progress >= last_logged + 10 {
                debug!(progress, "download progress");
                last_logged = progress;
            }
        }
    }
    tokio::io::AsyncWriteExt::flush(&mut file)
        .await
        .map_err(|e| AppError::model_load(format!("Failed to flush file: {}", e)))?;
    drop(file);

    tokio::fs::rename(&partial, dest).await.map_err(|e| {
        AppError::model_load(format!("Failed to finalize {}: {}", dest.display(), e))
    })?;

    Ok(())
}
