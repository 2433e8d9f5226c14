use serde::Serialize;
use thiserror::Error;

/// Category of a failure, used by the display surface to pick a message style.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Read,
    Decode,
    ModelLoad,
    ModelNotReady,
    Classification,
    Validation,
    Config,
    Io,
}

#[derive(Clone, Debug, Error, Serialize)]
#[error("{message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        AppError {
            kind,
            message: message.into(),
        }
    }

    pub fn read(file_name: &str, cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Read,
            format!("Failed to read file {}: {}", file_name, cause),
        )
    }

    pub fn decode(file_name: &str, cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Decode,
            format!("Failed to decode image {}: {}", file_name, cause),
        )
    }

    pub fn model_load(cause: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::ModelLoad, format!("Failed to load model: {}", cause))
    }

    pub fn model_not_ready(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelNotReady, message)
    }

    pub fn classification(file_name: &str, cause: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Classification,
            format!("Failed to classify {}: {}", file_name, cause),
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        Self::new(ErrorKind::Decode, err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(ErrorKind::ModelLoad, err.to_string())
    }
}

impl From<ort::Error> for AppError {
    fn from(err: ort::Error) -> Self {
        Self::new(ErrorKind::ModelLoad, err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        Self::new(ErrorKind::Io, msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        Self::new(ErrorKind::Io, msg)
    }
}
