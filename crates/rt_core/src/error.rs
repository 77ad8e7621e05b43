use thiserror::Error;

/// Errors surfaced by scene construction and the render controller.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A render is already in progress")]
    AlreadyRunning,

    #[error("No scene has been built yet")]
    NoScene,

    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Failed to load environment map: {0}")]
    Environment(#[from] image::ImageError),
}

impl RenderError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        RenderError::Configuration(message.into())
    }
}

/// Result type for rendering operations.
pub type Result<T> = std::result::Result<T, RenderError>;
