use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the retouch pipeline and editor.
///
/// Each variant maps to one failure domain: the validation gate, the size
/// reducer and segmentation collaborators, the compositing engine, and the
/// surrounding filesystem/configuration plumbing. The pipeline collapses all
/// of them into a single human-readable message on the `error` stage, so the
/// `Display` text of every variant is written to be shown to a user as-is.
#[derive(Error, Debug)]
pub enum RetouchError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid file: {reason}")]
    Validation { reason: String },

    #[error("Image processing error: {operation} failed")]
    ImageProcessing {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    /// Carries the segmentation collaborator's message verbatim.
    #[error("{message}")]
    Segmentation { message: String },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Editor not ready: {missing} image has not been loaded")]
    EditorNotReady { missing: &'static str },

    #[error("No processed image with id {id}")]
    UnknownRecord { id: String },
}

pub type Result<T> = std::result::Result<T, RetouchError>;

impl RetouchError {
    pub(crate) fn image_processing<E>(operation: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ImageProcessing {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }

    pub(crate) fn model<E>(operation: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Model {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}

/// anyhow errors only show up at configuration boundaries, so they are
/// flattened into a configuration message.
impl From<anyhow::Error> for RetouchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

/// Fallback for I/O errors raised without path context. Call sites that know
/// the path construct `RetouchError::FileSystem` themselves.
impl From<std::io::Error> for RetouchError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for RetouchError {
    fn from(err: image::ImageError) -> Self {
        Self::image_processing("image codec", err)
    }
}

impl From<ort::Error> for RetouchError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Shape errors only occur while reshaping inference tensors, so they are
/// reported as model errors.
impl From<ndarray::ShapeError> for RetouchError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::model("tensor shape conversion", err)
    }
}
