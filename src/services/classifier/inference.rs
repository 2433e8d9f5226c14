use crate::error::{AppError, ErrorKind};
use crate::models::classify_types::Prediction;
use crate::models::upload_types::DecodedImage;
use crate::services::classifier::ImageClassifier;
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use std::sync::{Arc, Mutex};

const CROP_PCT: f32 = 0.875;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn preprocess_image(img: &DynamicImage, crop_size: u32) -> Result<Array4<f32>, AppError> {
    // Resize shortest edge to ceil(crop_size / crop_pct), then center crop
    let resize_size = (crop_size as f32 / CROP_PCT).ceil() as u32;
    let (w, h) = (img.width().max(1), img.height().max(1));
    let (new_w, new_h) = if w < h {
        (resize_size, ((h as f32 / w as f32) * resize_size as f32).round() as u32)
    } else {
        (((w as f32 / h as f32) * resize_size as f32).round() as u32, resize_size)
    };
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let crop_x = (new_w.saturating_sub(crop_size)) / 2;
    let crop_y = (new_h.saturating_sub(crop_size)) / 2;
    let cropped = resized.crop_imm(crop_x, crop_y, crop_size, crop_size);
    let rgb = cropped.to_rgb8();

    // Normalize in HWC order, then transpose to CHW in tiles so the source and
    // all three channel planes stay in cache.
    let raw = rgb.into_raw();
    let hw = (crop_size * crop_size) as usize;
    let mut interleaved = vec![0f32; 3 * hw];
    for (i, pixel) in raw.chunks_exact(3).enumerate() {
        let off = i * 3;
        interleaved[off] = (pixel[0] as f32 / 255.0 - MEAN[0]) / STD[0];
        interleaved[off + 1] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
        interleaved[off + 2] = (pixel[2] as f32 / 255.0 - MEAN[2]) / STD[2];
    }

    let mut data = vec![0f32; 3 * hw];
    const TILE: usize = 1024;
    for base in (0..hw).step_by(TILE) {
        let end = (base + TILE).min(hw);
        for i in base..end {
            let src = i * 3;
            data[i] = interleaved[src];
            data[hw + i] = interleaved[src + 1];
            data[2 * hw + i] = interleaved[src + 2];
        }
    }

    Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data)
        .map_err(|e| AppError::new(ErrorKind::Classification, format!("Failed to create tensor: {}", e)))
}

/// Softmax the logits and keep the `top_k` most probable labels whose
/// probability is at least `min_probability`.
pub fn top_predictions(
    logits: &[f32],
    labels: &[String],
    top_k: usize,
    min_probability: f32,
) -> Vec<Prediction> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

    let mut indexed: Vec<(usize, f32)> = logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .enumerate()
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    indexed
        .into_iter()
        .take(top_k)
        .filter(|&(_, p)| p >= min_probability)
        .map(|(idx, probability)| {
            let class_name = labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx));
            Prediction {
                class_name,
                probability,
            }
        })
        .collect()
}

pub fn run_inference_with_model(
    model: &mut Session,
    input: Array4<f32>,
    labels: &[String],
    top_k: usize,
    min_probability: f32,
) -> Result<Vec<Prediction>, AppError> {
    let input_name = model.inputs()[0].name().to_string();

    let input_tensor = Value::from_array(input)
        .map_err(|e| AppError::new(ErrorKind::Classification, format!("Failed to create tensor value: {}", e)))?;

    let outputs = model
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError::new(ErrorKind::Classification, format!("Inference failed: {}", e)))?;

    let output_value = outputs
        .values()
        .next()
        .ok_or_else(|| AppError::new(ErrorKind::Classification, "Model produced no outputs"))?;

    let (_, data) = output_value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError::new(ErrorKind::Classification, format!("Failed to extract output tensor: {}", e)))?;

    Ok(top_predictions(data, labels, top_k, min_probability))
}

/// `ImageClassifier` backed by an ONNX Runtime session.
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    labels: Arc<Vec<String>>,
    crop_size: u32,
    top_k: usize,
    min_probability: f32,
}

impl OnnxClassifier {
    pub fn new(
        session: Session,
        labels: Vec<String>,
        crop_size: u32,
        top_k: usize,
        min_probability: f32,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            labels: Arc::new(labels),
            crop_size,
            top_k,
            min_probability,
        }
    }
}

#[async_trait]
impl ImageClassifier for OnnxClassifier {
    async fn classify(&self, image: &DecodedImage) -> Result<Vec<Prediction>, AppError> {
        let img = image.image.clone();
        let session = self.session.clone();
        let labels = self.labels.clone();
        let (crop_size, top_k, min_probability) = (self.crop_size, self.top_k, self.min_probability);

        // Preprocessing and the session run are CPU bound
        tokio::task::spawn_blocking(move || {
            let tensor = preprocess_image(&img, crop_size)?;
            let mut guard = session
                .lock()
                .map_err(|_| AppError::new(ErrorKind::Classification, "Model session lock poisoned"))?;
            run_inference_with_model(&mut guard, tensor, &labels, top_k, min_probability)
        })
        .await
        .map_err(|e| AppError::new(ErrorKind::Classification, format!("Inference task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn labels() -> Vec<String> {
        vec!["tabby cat".into(), "beagle".into(), "laptop".into()]
    }

    #[test]
    fn top_predictions_are_ranked_and_sum_to_one() {
        let preds = top_predictions(&[1.0, 3.0, 2.0], &labels(), 3, 0.0);
        let names: Vec<_> = preds.iter().map(|p| p.class_name.as_str()).collect();
        assert_eq!(names, vec!["beagle", "laptop", "tabby cat"]);
        let total: f32 = preds.iter().map(|p| p.probability).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn top_predictions_respects_k_and_threshold() {
        let preds = top_predictions(&[0.0, 10.0, 0.0], &labels(), 2, 0.5);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].class_name, "beagle");
    }

    #[test]
    fn unknown_index_gets_placeholder_label() {
        let preds = top_predictions(&[0.0, 0.0, 0.0, 9.0], &labels(), 1, 0.0);
        assert_eq!(preds[0].class_name, "class_3");
    }

    #[test]
    fn preprocess_produces_nchw_crop() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([255, 0, 0])));
        let tensor = preprocess_image(&img, 224).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let red = (1.0 - MEAN[0]) / STD[0];
        assert!((tensor[[0, 0, 100, 100]] - red).abs() < 0.05);
        let green = (0.0 - MEAN[1]) / STD[1];
        assert!((tensor[[0, 1, 100, 100]] - green).abs() < 0.05);
    }
}
