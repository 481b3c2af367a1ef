use thiserror::Error;

/// Errors surfaced by the capture pipeline.
///
/// Driver-contract violations are not represented here: they are logged and
/// the offending frame is dropped (see [`crate::capture::Delivery`]).
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration the pipeline cannot honour, e.g. widescreen blending
    /// of planar YUV input.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// The requested capture shape is not available on this hardware.
    #[error("capture not available: {0}")]
    CaptureUnavailable(String),

    #[error("camera driver error: {0}")]
    Driver(String),

    #[error("no camera format matches {0}")]
    FormatNegotiation(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A photo was requested before the compositor produced any frame.
    #[error("no composited frame available yet")]
    NoFrame,

    #[error("capture task cancelled")]
    Cancelled,

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
