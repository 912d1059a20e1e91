use thiserror::Error;

// Failures of the extraction pipeline itself

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("image contains no pixels")]
    EmptyImage,
    #[error("cannot form {k} clusters from {found} sampled pixels")]
    InsufficientPixels { k: usize, found: usize },
    #[error("clustering failed: {0}")]
    ComputationError(String),
    #[error("invalid extraction config: {0}")]
    InvalidConfig(String),
}

// Failures while turning an upload into a pixel buffer

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("no file uploaded")]
    NoFile,
    #[error("file type not allowed: {0}")]
    InvalidFileType(String),
    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("not a decodable image: {0}")]
    NotAnImage(#[from] image::ImageError),
}

// What the service layer reports back to a caller

#[derive(Error, Debug)]
pub enum ColorError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl ColorError {
    /// HTTP-style status for the failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ColorError::Intake(IntakeError::TooLarge { .. }) => 413,
            ColorError::Intake(_) => 400,
            ColorError::Extract(ExtractError::EmptyImage)
            | ColorError::Extract(ExtractError::InsufficientPixels { .. }) => 400,
            ColorError::Extract(ExtractError::ComputationError(_))
            | ColorError::Extract(ExtractError::InvalidConfig(_)) => 500,
        }
    }

    /// Message safe to show to the uploader. Server-side faults stay opaque.
    pub fn public_message(&self) -> String {
        match self {
            ColorError::Intake(IntakeError::NoFile) => "No file uploaded".into(),
            ColorError::Intake(IntakeError::InvalidFileType(_)) => "Invalid file type".into(),
            ColorError::Intake(IntakeError::TooLarge { .. }) => "Uploaded file is too large".into(),
            ColorError::Intake(IntakeError::NotAnImage(_)) => "Uploaded file is not a valid image".into(),
            ColorError::Extract(e @ ExtractError::EmptyImage)
            | ColorError::Extract(e @ ExtractError::InsufficientPixels { .. }) => e.to_string(),
            ColorError::Extract(_) => "Internal server error".into(),
        }
    }
}
