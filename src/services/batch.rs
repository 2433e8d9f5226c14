//! Upload batch orchestration and the state the display surface renders.
//!
//! A selection resets the view, decodes every file concurrently and then
//! classifies the decoded images one at a time in input order. Each batch
//! carries an id; anything a superseded batch produces is dropped instead of
//! published.

use crate::error::AppError;
use crate::models::classify_types::{ModelState, Prediction};
use crate::models::upload_types::{BatchId, BatchView, ErrorNotice, UploadBatch};
use crate::services::classifier::coordinator::ClassificationCoordinator;
use crate::services::ingestion::ImageIngestionPipeline;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct BatchController {
    pipeline: ImageIngestionPipeline,
    coordinator: ClassificationCoordinator,
    view: Arc<watch::Sender<BatchView>>,
    latest: Arc<AtomicU64>,
}

impl BatchController {
    /// Must be called inside a tokio runtime: the model watch runs as a task.
    pub fn new(coordinator: ClassificationCoordinator) -> Self {
        let (view, _) = watch::channel(BatchView::default());
        let controller = Self {
            pipeline: ImageIngestionPipeline::new(),
            coordinator,
            view: Arc::new(view),
            latest: Arc::new(AtomicU64::new(0)),
        };
        controller.watch_model();
        controller
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchView> {
        let model_loading = self.coordinator.is_loading();
        self.view.send_if_modified(|v| {
            let before = (v.model_loading, v.busy);
            apply_busy(v, model_loading);
            before != (v.model_loading, v.busy)
        });
        self.view.subscribe()
    }

    /// Current view with the model flag refreshed.
    pub fn view(&self) -> BatchView {
        let mut view = self.view.borrow().clone();
        apply_busy(&mut view, self.coordinator.is_loading());
        view
    }

    /// Mirror model load progress into the published view until the
    /// coordinator is dropped.
    fn watch_model(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, model loading will not be published");
            return;
        };
        let mut model = self.coordinator.subscribe();
        let view = self.view.clone();
        runtime.spawn(async move {
            while let Some(state) = model.changed().await {
                view.send_modify(|v| apply_busy(v, state == ModelState::Loading));
            }
            debug!("model watch stopped");
        });
    }

    /// Handle a file selection. Returns the view as left by this batch.
    pub async fn select_files(&self, batch: UploadBatch) -> BatchView {
        if batch.is_empty() {
            return self.view();
        }

        // Allocate the id under the view lock so ids and resets land in the same order
        let model_loading = self.coordinator.is_loading();
        let mut id = 0;
        self.view.send_modify(|v| {
            id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
            *v = BatchView {
                batch_id: id,
                file_names: batch.file_names(),
                processing: true,
                ..BatchView::default()
            };
            apply_busy(v, model_loading);
        });
        info!(batch = id, files = batch.len(), "processing upload batch");

        let outcome = self.run(id, &batch).await;

        let published = match &outcome {
            Ok(None) => false,
            Ok(Some(predictions)) => self.update(id, |v| {
                v.predictions = Some(predictions.clone());
                v.processing = false;
            }),
            Err(e) => self.update(id, |v| {
                v.last_error = Some(ErrorNotice::from(e));
                v.processing = false;
            }),
        };

        match (&outcome, published) {
            (Ok(Some(predictions)), true) => {
                info!(batch = id, predictions = predictions.len(), "upload batch finished")
            }
            (Err(e), true) => error!(batch = id, error = %e, "upload batch aborted"),
            (Err(e), false) => debug!(batch = id, error = %e, "superseded batch failed"),
            _ => debug!(batch = id, "discarding results of superseded batch"),
        }

        let mut view = self.view.borrow().clone();
        if view.batch_id != id {
            // A newer selection owns the view; report this batch as it ended.
            let (predictions, last_error) = match outcome {
                Ok(predictions) => (predictions, None),
                Err(e) => (None, Some(ErrorNotice::from(&e))),
            };
            view = BatchView {
                batch_id: id,
                file_names: batch.file_names(),
                predictions,
                last_error,
                ..BatchView::default()
            };
        }
        apply_busy(&mut view, self.coordinator.is_loading());
        view
    }

    /// Ingest and classify. `Ok(None)` means a newer batch took over before
    /// every image was classified.
    async fn run(&self, id: BatchId, batch: &UploadBatch) -> Result<Option<Vec<Prediction>>, AppError> {
        let images = self
            .pipeline
            .ingest(batch, |preview| {
                self.update(id, |v| v.previews.push(preview));
            })
            .await?;

        let mut predictions = Vec::new();
        for image in &images {
            if !self.is_current(id) {
                debug!(batch = id, "batch superseded, skipping remaining images");
                return Ok(None);
            }

            match self.coordinator.classify(image).await {
                Ok(preds) => predictions.extend(preds),
                Err(e) => {
                    warn!(batch = id, file = %image.file_name, error = %e, "no predictions for image");
                    self.update(id, |v| v.last_error = Some(ErrorNotice::from(&e)));
                }
            }
        }

        Ok(Some(predictions))
    }

    fn is_current(&self, id: BatchId) -> bool {
        self.latest.load(Ordering::SeqCst) == id
    }

    /// Apply `f` only if batch `id` still owns the view.
    fn update(&self, id: BatchId, f: impl FnOnce(&mut BatchView)) -> bool {
        let model_loading = self.coordinator.is_loading();
        self.view.send_if_modified(|v| {
            if v.batch_id != id {
                return false;
            }
            f(v);
            apply_busy(v, model_loading);
            true
        })
    }
}

fn apply_busy(view: &mut BatchView, model_loading: bool) {
    view.model_loading = model_loading;
    view.busy = model_loading || view.processing;
}
