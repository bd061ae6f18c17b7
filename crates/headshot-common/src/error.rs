use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeadshotError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("job not found: {0}")]
    JobNotFound(usize),
    #[error("no source image has been uploaded")]
    NoSourceImage,
    #[error("a batch run is already in progress")]
    BatchInProgress,
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HeadshotError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::JobNotFound(_) => "NoSuchJob",
            Self::NoSourceImage => "NoSourceImage",
            Self::BatchInProgress => "BatchInProgress",
            Self::UnsupportedImage(_) => "UnsupportedImage",
            Self::Generation(_) => "GenerationFailed",
            Self::Export(_) => "ExportFailed",
            Self::InternalError(_) => "InternalError",
            Self::Io(_) => "InternalError",
        }
    }
}

pub type Result<T> = std::result::Result<T, HeadshotError>;
