use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("field projector is not configured, call configure first")]
    NotConfigured,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("field corners do not define a projective mapping")]
    DegenerateCorners,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("got {frames} frames but {tracks} track frames")]
    LengthMismatch { frames: usize, tracks: usize },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[cfg(feature = "opencv")]
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
