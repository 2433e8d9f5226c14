//! Owns the lifecycle of the classification model.
//!
//! The model moves `Unloaded -> Loading -> Ready | Failed`. The state lives in
//! a watch channel so that every caller waiting on a load observes the same
//! transition. Exactly one load runs at a time; calling `ensure_ready` after a
//! failure starts one new attempt.

use crate::error::{AppError, ErrorKind};
use crate::models::classify_types::{ModelState, ModelStatus, Prediction};
use crate::models::upload_types::DecodedImage;
use crate::services::classifier::{ImageClassifier, ModelProvider};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Clone)]
enum Slot {
    Unloaded,
    Loading,
    Ready(Arc<dyn ImageClassifier>),
    Failed(AppError),
}

impl Slot {
    fn state(&self) -> ModelState {
        match self {
            Slot::Unloaded => ModelState::Unloaded,
            Slot::Loading => ModelState::Loading,
            Slot::Ready(_) => ModelState::Ready,
            Slot::Failed(_) => ModelState::Failed,
        }
    }
}

#[derive(Clone)]
pub struct ClassificationCoordinator {
    provider: Arc<dyn ModelProvider>,
    slot: Arc<watch::Sender<Slot>>,
}

impl ClassificationCoordinator {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        let (slot, _) = watch::channel(Slot::Unloaded);
        Self {
            provider,
            slot: Arc::new(slot),
        }
    }

    pub fn state(&self) -> ModelState {
        self.slot.borrow().state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    pub fn is_loading(&self) -> bool {
        self.state() == ModelState::Loading
    }

    pub fn status(&self) -> ModelStatus {
        let slot = self.slot.borrow();
        let state = slot.state();
        ModelStatus {
            state,
            loading: state == ModelState::Loading,
            ready: state == ModelState::Ready,
            error: match &*slot {
                Slot::Failed(e) => Some(e.message.clone()),
                _ => None,
            },
        }
    }

    /// Stream of model state changes.
    pub fn subscribe(&self) -> ModelStateWatch {
        ModelStateWatch {
            rx: self.slot.subscribe(),
        }
    }

    /// Make sure the model is loaded, starting the load if nobody has yet.
    /// Concurrent callers share the in-flight load.
    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        let start = self.slot.send_if_modified(|slot| match slot {
            Slot::Unloaded | Slot::Failed(_) => {
                *slot = Slot::Loading;
                true
            }
            Slot::Loading | Slot::Ready(_) => false,
        });

        if start {
            self.spawn_load();
        }

        self.settled().await.map(|_| ())
    }

    /// Classify one image.
    ///
    /// Waits for a load that is in flight. Fails with `ModelNotReady` when no
    /// load was ever started or the last load failed.
    pub async fn classify(&self, image: &DecodedImage) -> Result<Vec<Prediction>, AppError> {
        let current = self.slot.borrow().clone();
        let model = match current {
            Slot::Ready(model) => model,
            Slot::Loading => self
                .settled()
                .await
                .map_err(|e| AppError::model_not_ready(format!("Model not loaded: {}", e)))?,
            Slot::Unloaded => return Err(AppError::model_not_ready("Model not loaded")),
            Slot::Failed(e) => {
                return Err(AppError::model_not_ready(format!("Model not loaded: {}", e)))
            }
        };

        model
            .classify(image)
            .await
            .map_err(|e| AppError::classification(&image.file_name, e))
    }

    fn spawn_load(&self) {
        let provider = self.provider.clone();
        let slot = self.slot.clone();
        info!("loading classification model");

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(provider.load()).catch_unwind().await;
            let next = match outcome {
                Ok(Ok(model)) => {
                    info!("classification model ready");
                    Slot::Ready(model)
                }
                Ok(Err(e)) => {
                    let e = if e.kind == ErrorKind::ModelLoad { e } else { AppError::model_load(e) };
                    error!(error = %e, "classification model failed to load");
                    Slot::Failed(e)
                }
                Err(_) => {
                    error!("classification model loader panicked");
                    Slot::Failed(AppError::model_load("loader panicked"))
                }
            };
            slot.send_replace(next);
        });
    }

    async fn settled(&self) -> Result<Arc<dyn ImageClassifier>, AppError> {
        let mut rx = self.slot.subscribe();
        let slot = rx
            .wait_for(|slot| !matches!(slot, Slot::Loading))
            .await
            .map_err(|_| AppError::model_load("model state channel closed"))?;

        match &*slot {
            Slot::Ready(model) => Ok(model.clone()),
            Slot::Failed(e) => Err(e.clone()),
            Slot::Unloaded | Slot::Loading => Err(AppError::model_not_ready("Model not loaded")),
        }
    }
}

/// Read side of the model state, for display surfaces.
pub struct ModelStateWatch {
    rx: watch::Receiver<Slot>,
}

impl ModelStateWatch {
    pub fn state(&self) -> ModelState {
        self.rx.borrow().state()
    }

    /// Wait for the next transition. Returns `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<ModelState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().state())
    }
}
