use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct Description {
    pub text: String,
    pub confidence: f32,
    pub used_predictions: Vec<String>,
    pub processing_time: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
    pub processing_time: f64,
    pub question: String,
}
