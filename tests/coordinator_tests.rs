mod common;

use common::{MockClassifier, MockProvider};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use visu_ai_lib::services::classifier::coordinator::ClassificationCoordinator;
use visu_ai_lib::{DecodedImage, ErrorKind, ModelState, Prediction};

fn decoded(name: &str) -> DecodedImage {
    DecodedImage {
        index: 0,
        file_name: name.to_string(),
        image: Arc::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4))),
    }
}

#[tokio::test]
async fn classify_without_load_fails_immediately() {
    let provider = Arc::new(MockProvider::new(Arc::new(MockClassifier::new())));
    let coordinator = ClassificationCoordinator::new(provider.clone());

    let result = tokio::time::timeout(Duration::from_secs(1), coordinator.classify(&decoded("cat.jpg")))
        .await
        .expect("classify must not hang");

    assert_eq!(result.unwrap_err().kind, ErrorKind::ModelNotReady);
    assert_eq!(provider.load_count(), 0);
    assert_eq!(coordinator.state(), ModelState::Unloaded);
}

#[tokio::test]
async fn ready_model_results_are_forwarded_unchanged() {
    let classifier = Arc::new(common::pets_classifier());
    let coordinator = ClassificationCoordinator::new(Arc::new(MockProvider::new(classifier.clone())));

    coordinator.ensure_ready().await.unwrap();
    let preds = coordinator.classify(&decoded("cat.jpg")).await.unwrap();

    assert_eq!(preds, vec![Prediction::new("tabby cat", 0.92)]);
    assert_eq!(classifier.call_count(), 1);
}

#[tokio::test]
async fn model_errors_become_classification_errors() {
    let classifier = Arc::new(MockClassifier::new().failing_on("dog.jpg"));
    let coordinator = ClassificationCoordinator::new(Arc::new(MockProvider::new(classifier)));
    coordinator.ensure_ready().await.unwrap();

    let err = coordinator.classify(&decoded("dog.jpg")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Classification);
    assert!(err.message.contains("dog.jpg"));
    assert!(err.message.contains("inference backend crashed"));
}

#[tokio::test]
async fn many_waiters_trigger_a_single_load() {
    let provider = Arc::new(
        MockProvider::new(Arc::new(MockClassifier::new())).with_load_latency(Duration::from_millis(30)),
    );
    let coordinator = ClassificationCoordinator::new(provider.clone());

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let c = coordinator.clone();
            tokio::spawn(async move { c.ensure_ready().await })
        })
        .collect();
    for w in waiters {
        w.await.unwrap().unwrap();
    }

    assert_eq!(provider.load_count(), 1);
    assert!(coordinator.status().ready);
}

#[tokio::test]
async fn failed_load_reports_status_and_blocks_classify() {
    let provider = Arc::new(MockProvider::new(Arc::new(MockClassifier::new())).failing());
    let coordinator = ClassificationCoordinator::new(provider.clone());

    let err = coordinator.ensure_ready().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ModelLoad);

    let status = coordinator.status();
    assert_eq!(status.state, ModelState::Failed);
    assert!(!status.loading);
    assert!(status.error.unwrap().contains("weights unavailable"));

    let err = coordinator.classify(&decoded("cat.jpg")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ModelNotReady);
    assert_eq!(provider.load_count(), 1);
}
