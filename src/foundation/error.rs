use std::time::Duration;

pub type VedResult<T> = Result<T, VedError>;

#[derive(thiserror::Error, Debug)]
pub enum VedError {
    /// Invalid placement, format or option supplied by the caller.
    #[error("configuration error: {0}")]
    Config(String),

    /// A decoder ran dry while a read was still expected.
    #[error("resource exhausted: {0}")]
    Exhausted(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("encoder failed: {stderr}")]
    EncoderFailed { stderr: String },

    #[error("encoder did not finish within {0:?}")]
    EncoderTimeout(Duration),

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VedError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::Exhausted(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn encoder_failed(stderr: impl Into<String>) -> Self {
        Self::EncoderFailed {
            stderr: stderr.into(),
        }
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
