use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::models::describe_types::{Answer, Description};
use crate::AppState;

pub fn describe_predictions(state: &AppState, predictions: &[Prediction]) -> Result<Description, AppError> {
    state.descriptions.describe(predictions)
}

pub async fn ask_question(
    state: &AppState,
    predictions: &[Prediction],
    question: &str,
) -> Result<Answer, AppError> {
    state.descriptions.ask(predictions, question).await
}
