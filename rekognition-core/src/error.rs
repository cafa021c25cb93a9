use thiserror::Error;

#[derive(Error, Debug)]
pub enum RekognitionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Camera source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Rekognition service error: {0}")]
    Service(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<image::ImageError> for RekognitionError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

impl From<serde_json::Error> for RekognitionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RekognitionError>;
