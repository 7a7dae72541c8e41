use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for script language identification.
///
/// Each variant carries the context of its failure domain (registry lookup,
/// model download, archive extraction, image decoding, inference, report
/// writing) so callers can tell provisioning faults apart from classification
/// faults without parsing strings.
#[derive(Error, Debug)]
pub enum LangIdError {
    #[error("Unknown model: {key}")]
    UnknownModel { key: String },

    #[error("Network error: download failed for {url:?}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Corrupt archive: extraction failed for {path:?}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Error: {message}")]
    MissingArguments { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Classification error: {reason} (file: {path})")]
    Classification { path: String, reason: String },

    #[error("Report error: writing {path:?} failed")]
    Report {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub type Result<T> = std::result::Result<T, LangIdError>;

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build
/// `LangIdError::FileSystem` directly; this is the fallback for `?`.
impl From<std::io::Error> for LangIdError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for LangIdError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for LangIdError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}
