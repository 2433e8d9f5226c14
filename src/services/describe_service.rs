//! Natural-language summaries of classifier output.
//!
//! Template based: the top prediction picks a sentence, and questions are
//! routed by keyword. Answers are cached per question and top-3 labels.

use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::models::describe_types::{Answer, Description};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_PREDICTIONS: usize = 10;
const MIN_QUESTION_LEN: usize = 3;
const MAX_QUESTION_LEN: usize = 500;
const ANSWER_CACHE_CAPACITY: usize = 1024;

const TEMPLATES: &[(&str, &str)] = &[
    ("laptop", "A laptop computer is visible in the image."),
    ("cat", "A cat is present in the image."),
    ("dog", "A dog is visible in the image."),
    ("person", "A person is present in the image."),
    ("car", "A car is visible in the image."),
];

const ANIMALS: &[&str] = &["cat", "dog", "bird", "horse", "elephant", "tiger", "lion"];

/// Answers keyed by question and top labels. Oldest entries go first once
/// the capacity is reached.
struct AnswerCache {
    entries: HashMap<String, (String, f32)>,
    order: VecDeque<String>,
    capacity: usize,
}

impl AnswerCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &str) -> Option<&(String, f32)> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: String, answer: (String, f32)) {
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, answer);
    }
}

#[derive(Clone)]
pub struct DescriptionService {
    cache: Arc<Mutex<AnswerCache>>,
}

impl Default for DescriptionService {
    fn default() -> Self {
        Self::with_cache_capacity(ANSWER_CACHE_CAPACITY)
    }
}

impl DescriptionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(AnswerCache::new(capacity))),
        }
    }

    pub fn describe(&self, predictions: &[Prediction]) -> Result<Description, AppError> {
        let start = Instant::now();
        let predictions = sanitize(predictions)?;

        let top: Vec<&Prediction> = predictions.iter().take(3).collect();
        let used_predictions = top.iter().map(|p| p.class_name.clone()).collect();
        let first = top[0];
        let lower = first.class_name.to_lowercase();

        let text = match TEMPLATES.iter().find(|(key, _)| lower.contains(key)) {
            Some((_, sentence)) => sentence.to_string(),
            None => {
                let mut text = format!("The image appears to show {}", humanize(&first.class_name));
                if let Some(second) = top.get(1) {
                    text.push_str(&format!(", with {} also present", humanize(&second.class_name)));
                }
                text.push('.');
                text
            }
        };

        Ok(Description {
            text,
            confidence: (first.probability * 0.9).min(0.95),
            used_predictions,
            processing_time: start.elapsed().as_secs_f64(),
        })
    }

    pub async fn ask(&self, predictions: &[Prediction], question: &str) -> Result<Answer, AppError> {
        let start = Instant::now();
        let predictions = sanitize(predictions)?;
        let question = question.trim();
        let len = question.chars().count();
        if !(MIN_QUESTION_LEN..=MAX_QUESTION_LEN).contains(&len) {
            return Err(AppError::validation(format!(
                "Question must be between {} and {} characters",
                MIN_QUESTION_LEN, MAX_QUESTION_LEN
            )));
        }

        let top3: Vec<&str> = predictions.iter().take(3).map(|p| p.class_name.as_str()).collect();
        let cache_key = format!("{}::{}", question, top3.join(","));

        let mut cache = self.cache.lock().await;
        let (text, confidence) = match cache.get(&cache_key) {
            Some(hit) => {
                debug!(question, "answer served from cache");
                hit.clone()
            }
            None => {
                let answer = answer_question(&predictions, question);
                cache.insert(cache_key, answer.clone());
                answer
            }
        };

        Ok(Answer {
            text,
            confidence,
            processing_time: start.elapsed().as_secs_f64(),
            question: question.to_string(),
        })
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }
}

/// Validate, trim and sort predictions by probability, highest first.
fn sanitize(predictions: &[Prediction]) -> Result<Vec<Prediction>, AppError> {
    if predictions.is_empty() {
        return Err(AppError::validation("At least one prediction is required"));
    }
    if predictions.len() > MAX_PREDICTIONS {
        return Err(AppError::validation(format!(
            "At most {} predictions are accepted",
            MAX_PREDICTIONS
        )));
    }

    let mut cleaned = Vec::with_capacity(predictions.len());
    for p in predictions {
        let class_name = p.class_name.trim();
        if class_name.is_empty() {
            return Err(AppError::validation("className cannot be empty"));
        }
        if !(0.0..=1.0).contains(&p.probability) {
            return Err(AppError::validation(format!(
                "probability of {} must be within [0, 1]",
                class_name
            )));
        }
        cleaned.push(Prediction::new(class_name, p.probability));
    }
    cleaned.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(cleaned)
}

fn humanize(class_name: &str) -> String {
    class_name.replace('_', " ")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn answer_question(predictions: &[Prediction], question: &str) -> (String, f32) {
    let q = question.to_lowercase();
    let top = &predictions[0];
    let top_class = humanize(&top.class_name);

    if contains_any(&q, &["what", "which", "identify"]) {
        if q.contains("animal") {
            for pred in predictions {
                let lower = pred.class_name.to_lowercase();
                if ANIMALS.iter().any(|a| lower.contains(a)) {
                    return (
                        format!("The animal appears to be a {}.", humanize(&pred.class_name)),
                        pred.probability * 0.9,
                    );
                }
            }
            return ("I cannot identify a specific animal in this image.".to_string(), 0.3);
        }
        if q.contains("object") || q.contains("see") {
            return (format!("I can see {} in the image.", top_class), top.probability * 0.85);
        }
        return (
            format!("The main subject appears to be {}.", top_class),
            top.probability * 0.8,
        );
    }

    if contains_any(&q, &["how many", "count"]) {
        return (
            "Based on the predictions, there appears to be one main subject.".to_string(),
            0.6,
        );
    }

    if contains_any(&q, &["is there", "are there", "can you see"]) {
        for pred in predictions {
            let lower = pred.class_name.to_lowercase();
            if q.contains(&lower) || lower.split('_').any(|word| q.contains(word)) {
                return (
                    format!("Yes, I can see {} in the image.", humanize(&pred.class_name)),
                    pred.probability * 0.9,
                );
            }
        }
        return (
            "No, I cannot identify that in the image based on the available information."
                .to_string(),
            0.5,
        );
    }

    if contains_any(&q, &["where", "location", "position"]) {
        return (
            "I can identify the object but cannot determine its exact position without spatial information."
                .to_string(),
            0.4,
        );
    }

    if contains_any(&q, &["why", "reason"]) {
        return (
            "I can describe what's visible but cannot infer intent or reasoning.".to_string(),
            0.3,
        );
    }

    (
        format!("Based on the image, the main subject appears to be {}.", top_class),
        top.probability * 0.7,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn preds(items: &[(&str, f32)]) -> Vec<Prediction> {
        items.iter().map(|(n, p)| Prediction::new(*n, *p)).collect()
    }

    #[test]
    fn describe_uses_template_for_known_key() {
        let service = DescriptionService::new();
        let d = service.describe(&preds(&[("desk", 0.3), ("laptop", 0.9)])).unwrap();
        assert_eq!(d.text, "A laptop computer is visible in the image.");
        assert_eq!(d.used_predictions, vec!["laptop", "desk"]);
        assert!((d.confidence - 0.81).abs() < 1e-5);
    }

    #[test]
    fn describe_generic_sentence_mentions_runner_up() {
        let service = DescriptionService::new();
        let d = service
            .describe(&preds(&[("golden_retriever", 0.99), ("tennis_ball", 0.4)]))
            .unwrap();
        assert_eq!(
            d.text,
            "The image appears to show golden retriever, with tennis ball also present."
        );
        assert!((d.confidence - 0.891).abs() < 1e-5);
    }

    #[test]
    fn describe_rejects_bad_input() {
        let service = DescriptionService::new();
        assert_eq!(service.describe(&[]).unwrap_err().kind, ErrorKind::Validation);
        let err = service.describe(&preds(&[("  ", 0.5)])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = service.describe(&preds(&[("cat", 1.2)])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn ask_routes_by_question_kind() {
        let service = DescriptionService::new();
        let p = preds(&[("tabby_cat", 0.9), ("sofa", 0.2)]);

        let a = service.ask(&p, "What animal is this?").await.unwrap();
        assert_eq!(a.text, "The animal appears to be a tabby cat.");
        assert!((a.confidence - 0.81).abs() < 1e-5);

        let a = service.ask(&p, "Is there a sofa?").await.unwrap();
        assert_eq!(a.text, "Yes, I can see sofa in the image.");

        let a = service.ask(&p, "How many are there?").await.unwrap();
        assert_eq!(a.confidence, 0.6);

        let a = service.ask(&p, "Where is it?").await.unwrap();
        assert_eq!(a.confidence, 0.4);

        let a = service.ask(&p, "Tell me more").await.unwrap();
        assert_eq!(a.text, "Based on the image, the main subject appears to be tabby cat.");
    }

    #[tokio::test]
    async fn ask_caches_answers() {
        let service = DescriptionService::new();
        let p = preds(&[("beagle", 0.8)]);
        let first = service.ask(&p, "  What do you see?  ").await.unwrap();
        let second = service.ask(&p, "What do you see?").await.unwrap();
        assert_eq!(first.text, second.text);
        assert_eq!(first.question, "What do you see?");
        assert_eq!(service.cache_len().await, 1);
    }

    #[tokio::test]
    async fn answer_cache_is_bounded() {
        let service = DescriptionService::with_cache_capacity(2);
        let p = preds(&[("beagle", 0.8)]);
        for question in ["Is there a dog?", "Is there a cat?", "Is there a car?"] {
            service.ask(&p, question).await.unwrap();
        }
        assert_eq!(service.cache_len().await, 2);

        let cache = service.cache.lock().await;
        assert!(cache.get("Is there a dog?::beagle").is_none());
        assert!(cache.get("Is there a car?::beagle").is_some());
    }

    #[tokio::test]
    async fn ask_rejects_short_question() {
        let service = DescriptionService::new();
        let err = service.ask(&preds(&[("beagle", 0.8)]), " hi ").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
